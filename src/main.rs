use twilio_chat_provider::{init_logging, serve, TwilioProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Twilio Chat provider");
    serve(TwilioProvider::new()).await
}
