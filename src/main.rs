use tag_promoter::cli::{Args, Runner};
use tag_promoter::logging::{Logger, init_tracing};

#[tokio::main]
async fn main() {
    let args = Args::parse_args();
    init_tracing(args.debug);

    if let Err(e) = args.validate() {
        Logger::new(false).error(&format!("Invalid arguments: {}", e));
        std::process::exit(1);
    }

    let code = Runner::new(&args).run().await;
    std::process::exit(code);
}
