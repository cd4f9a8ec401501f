use anyhow::Result;
use axum::Router;
use clap::Parser;
use etm_core::sparse::Normalization;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};
use server::{build_app, AppState, ModelSpec};
use tokio::net::TcpListener;

#[derive(Parser)]
struct Args {
    /// Model directory, as `dir` or `name=dir`; repeat to serve several. The first is the default.
    #[arg(long = "model", required = true)]
    models: Vec<ModelSpec>,
    /// L2-normalize loaded weights along rows or columns
    #[arg(long, value_enum, default_value_t = NormalizationArg::None)]
    normalization: NormalizationArg,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum NormalizationArg {
    None,
    Rows,
    Columns,
}

impl From<NormalizationArg> for Normalization {
    fn from(n: NormalizationArg) -> Self {
        match n {
            NormalizationArg::None => Normalization::None,
            NormalizationArg::Rows => Normalization::Rows,
            NormalizationArg::Columns => Normalization::Columns,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let state = AppState::load(&args.models, args.normalization.into())?;
    let app: Router = build_app(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
