#[tokio::main]
async fn main() -> anyhow::Result<()> {
    studio_capture::run().await
}
