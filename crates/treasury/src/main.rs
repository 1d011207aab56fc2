use tracing::error;

#[tokio::main]
async fn main() {
    if let Err(e) = lib_treasury::init().await {
        // Logging may not be initialized if startup failed early.
        eprintln!("❌ Treasury failed: {e}");
        error!("❌ Treasury failed: {e:?}");
        std::process::exit(1);
    }
}
