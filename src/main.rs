/// Entry point for Docker Graph.
///
/// Reads its configuration from `DOCKER_GRAPH_*` environment variables and
/// connects to the Docker daemon named by `DOCKER_HOST`, or the local socket.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=docker_graph=debug DOCKER_GRAPH_BIND=0.0.0.0:8080 cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = docker_graph::config::Config::from_env()?;
    docker_graph::run(config).await
}
