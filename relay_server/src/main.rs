#[tokio::main]
async fn main() {
    if let Err(e) = relay_server::frameworks::server::run_with_config().await {
        tracing::error!(error = %e, "relay exited with error");
    }
}
