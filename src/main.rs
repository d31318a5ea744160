#[tokio::main]
async fn main() -> anyhow::Result<()> {
    trends_cube_api::cli::run_with_sys_args().await
}
