use std::{ fs, path::PathBuf, process::ExitCode };
use clap::Parser;
use tracing::info;
use tracing_subscriber::{ fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter };
use znp::{ backup::{ self, DEFAULT_COUNTER_INCREMENT }, config::Config, Error };

/// Restore adapter network settings
#[derive(Parser, Debug)]
#[command(name = "znp-restore", version, about = "Restore adapter network settings")]
struct Args {
	/// Serial port of the radio
	serial: String,

	/// Backup file
	#[arg(short, long)]
	input: PathBuf,

	/// Added to every stored frame counter
	#[arg(short, long, default_value_t = DEFAULT_COUNTER_INCREMENT)]
	counter_increment: u32,

	/// Optional JSON config with baudrate and timeouts
	#[arg(long)]
	config: Option<PathBuf>,

	/// Log level when RUST_LOG is not set
	#[arg(long, default_value = "info")]
	log_level: String
}

async fn run(args: Args) -> Result<(), Error> {
	let mut config = match &args.config {
		Some(path) => Config::from_file(path)?,
		None => Config::default()
	};

	config.device.path = args.serial;

	let document: serde_json::Value = serde_json::from_str(&fs::read_to_string(&args.input)?)?;

	info!("Restoring {} to {} (counter increment {})", args.input.display(), config.device.path, args.counter_increment);

	backup::restore_network(&config, document, args.counter_increment).await?;

	info!("Restore complete");

	Ok(())
}

#[async_std::main]
async fn main() -> ExitCode {
	let args = Args::parse();
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

	match run(args).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			eprintln!("Restore failed: {e}");
			ExitCode::FAILURE
		}
	}
}
