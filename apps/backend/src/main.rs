#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wenbun_backend::run().await
}
