use mock_server::{Store, Visibility};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;

    let mut store = Store::new();
    let example = store.add_group("example", "example", Visibility::Public);
    if let Some(project) = store.add_project(example, "Example Project") {
        store.add_merge_request(project, "Add README", "readme", "0a1b2c3d");
    }

    tracing::info!(%addr, "mock GitLab listening");
    mock_server::run_with(listener, store).await
}
