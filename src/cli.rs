use clap::Parser;

use kitchen_storage_manager::source::MAX_SEED;

#[derive(Parser, Debug)]
#[command(about = "Execution Harness for the kitchen Storage Manager")]
pub struct Args {
    #[arg(long, help = "Challenge server endpoint")]
    pub endpoint: String,

    #[arg(long, help = "Authorization token (required)")]
    pub auth: String,

    #[arg(short, long, default_value_t = String::default(), help = "Problem name (optional)")]
    pub name: String,

    #[arg(
        short,
        long,
        default_value = "0",
        value_parser = clap::value_parser!(u64).range(0..MAX_SEED),
        help = "RNG seed for pickup delays (optional; default = random)"
    )]
    pub seed: u64,

    #[arg(long, default_value = "2.0", help = "Arrivals per second; must be > 0")]
    pub rate: f64,

    #[arg(
        long = "pickup-min",
        default_value = "4",
        help = "Minimum pickup delay in seconds"
    )]
    pub pickup_min: u64,

    #[arg(
        long = "pickup-max",
        default_value = "8",
        help = "Maximum pickup delay in seconds; must be >= pickup-min"
    )]
    pub pickup_max: u64,
}
