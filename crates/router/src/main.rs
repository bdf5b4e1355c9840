use router::runtime::{boot, serve};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (state, config) = boot::boot()?;
    serve::serve(state, config).await
}
