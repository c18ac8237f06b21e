//! `tiffstage` binary entrypoint.
#![forbid(unsafe_code)]

#[tokio::main]
async fn main() {
    let code = tiffstage_cli::run().await;
    std::process::exit(code);
}
