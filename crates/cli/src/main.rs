use clap::Parser;
use loadwatch::{Session, engine_channel};
use loadwatch_cli::{cli::Cli, config, engine::ChromiumEngine, formatter, logging};
use tracing::error;

#[tokio::main(flavor = "current_thread")]
async fn main() {
	let cli = Cli::parse();
	logging::init(cli.verbose, cli.log.as_deref());

	let code = match run(cli).await {
		Ok(()) => 0,
		Err(err) => {
			error!(target: "lw", error = %err, "run failed");
			err.exit_code()
		}
	};
	std::process::exit(code);
}

async fn run(cli: Cli) -> loadwatch::Result<()> {
	let settings = config::resolve(cli)?;

	let (events_tx, events_rx) = engine_channel();
	let engine = ChromiumEngine::launch(events_tx)?;
	let session = Session::new(settings.session, Box::new(engine), events_rx)?;

	let report = session.run().await?;
	if !settings.silent {
		println!("{}", formatter::render(&report, settings.format));
	}
	Ok(())
}
