use clap::Parser;

/// Workflow manager CLI arguments. Each flag overrides its environment key.
#[derive(Debug, Parser)]
#[command(
    name = "workflow-manager",
    version,
    about = "Serves workflow stage intervals from a continuously synchronised cache"
)]
pub struct Cli {
    /// Backing store connection string (DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Path to the workflow definition JSON (WORKFLOW_DEFINITION_PATH)
    #[arg(long)]
    pub workflow_definition: Option<String>,

    /// Cache synchronisation period in seconds (POLLING_PERIOD_SECONDS)
    #[arg(long)]
    pub polling_period: Option<u64>,

    /// HTTP listen address (API_BIND_ADDR)
    #[arg(long)]
    pub bind: Option<String>,

    /// Event bus webhook endpoint (EVENT_BUS_URL)
    #[arg(long)]
    pub event_bus_url: Option<String>,
}
