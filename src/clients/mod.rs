pub mod project_store_client;
