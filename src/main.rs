#[tokio::main]
async fn main() {
    if let Err(e) = hours_lib::run().await {
        tracing::error!("Server failed: {}", e);
        eprintln!("hours: {e}");
        std::process::exit(1);
    }
}
