//! CLI for wrmon.
//!
//! One subcommand per monitoring check, plus raw `wql` and `schema`
//! commands for ad-hoc queries. Connection and threshold arguments are
//! shared across subcommands.

pub mod checks;

use clap::{Args, Parser, Subcommand};

use wrmon::transport::DEFAULT_PORT;

/// wrmon - WS-Management monitoring checks for Windows hosts
#[derive(Parser, Debug)]
#[command(name = "wrmon")]
#[command(version)]
#[command(about = "Query Windows hosts over WS-Management (WinRM) with NTLM", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Connection parameters shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Host name or IP address of the Windows server
    #[arg(short = 'H', long)]
    pub hostname: String,

    /// WinRM port
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Username, as DOMAIN\user or user@domain
    #[arg(short = 'u', long, env = "WR_USERNAME")]
    pub username: String,

    /// Domain password
    #[arg(short = 'P', long, env = "WR_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Seconds before the whole check times out
    #[arg(short = 't', long, default_value_t = 10)]
    pub timeout: u64,
}

/// Warning/critical thresholds shared by the checks.
#[derive(Args, Debug, Clone, Default)]
pub struct ThresholdArgs {
    /// Warning threshold
    #[arg(short = 'w', long)]
    pub warning: Option<i64>,

    /// Critical threshold
    #[arg(short = 'c', long)]
    pub critical: Option<i64>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// CPU usage (thresholds in percent)
    Cpu(checks::CpuArgs),

    /// Physical memory usage (thresholds in percent used)
    Memory(checks::MemoryArgs),

    /// Local disk free space (thresholds in percent used, worst volume wins)
    Disk(checks::DiskArgs),

    /// Windows service states (thresholds on the stopped count)
    Service(checks::ServiceArgs),

    /// Time since last boot (thresholds in hours)
    Uptime(checks::UptimeArgs),

    /// Page file usage (thresholds in percent used)
    Pagefile(checks::PagefileArgs),

    /// Run an arbitrary WQL query and print the typed result set
    Wql(checks::WqlArgs),

    /// Fetch and print the CIM schema for a class
    Schema(checks::SchemaArgs),
}
