use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "courtwatch", about = "Tennis court availability checker")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in once, check the selection and print the records
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Send a notification when something is available
        #[arg(short, long)]
        notify: bool,
    },
    /// Check on a schedule until interrupted
    Watch {
        /// Minutes between checks (overrides the config)
        #[arg(short, long)]
        interval: Option<u32>,
    },
    /// Run the availability parser over a saved results page
    Parse {
        /// HTML file
        file: String,

        /// Print the records as JSON
        #[arg(long)]
        json: bool,
    },
}
