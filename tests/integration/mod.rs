mod csmar_client_http;
mod download_pipeline;
