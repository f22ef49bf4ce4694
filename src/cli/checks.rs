//! The monitoring checks: thin consumers of the protocol engine.
//!
//! Every check opens a session, runs one WQL query context, extracts
//! typed properties, and prints a Nagios-style status line. The whole
//! check runs under a timeout that exits UNKNOWN.

use std::future::Future;
use std::time::Duration;

use clap::Args;
use regex::Regex;
use tracing::debug;

use wrmon::cim::{ClassInstance, ClassInstanceSet, ClassSchema};
use wrmon::error::{Result, WrError};
use wrmon::nagios::{classify, parse_cim_datetime, status_line, CheckStatus, Perfdata};
use wrmon::protocol::WsmanClient;
use wrmon::transport::ntlm::NtlmCredentials;
use wrmon::transport::{endpoint_url, Session};
use wrmon::wql::QueryContext;
use wrmon::xml::Document;

use super::{ConnectionArgs, ThresholdArgs};

const NAMESPACE: &str = "root/cimv2";

// ============================================================================
// Shared plumbing
// ============================================================================

/// Run a check body under the configured timeout; failures and expiry
/// both surface as UNKNOWN.
async fn run_with_timeout<F>(timeout_secs: u64, body: F) -> CheckStatus
where
    F: Future<Output = Result<CheckStatus>>,
{
    match tokio::time::timeout(Duration::from_secs(timeout_secs), body).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            println!("UNKNOWN - {e}");
            CheckStatus::Unknown
        }
        Err(_) => {
            println!("UNKNOWN - check timed out after {timeout_secs} seconds");
            CheckStatus::Unknown
        }
    }
}

/// Authenticate a session for the connection arguments.
async fn connect(conn: &ConnectionArgs) -> Result<WsmanClient<Session>> {
    let credentials = NtlmCredentials::new(conn.username.clone(), conn.password.clone());
    let mut session = Session::new(
        endpoint_url(&conn.hostname, conn.port),
        credentials,
        Duration::from_secs(conn.timeout),
    )?;
    session.login().await?;
    Ok(WsmanClient::new(session))
}

/// Connect, build a query context, and run it once.
async fn open_query(
    conn: &ConnectionArgs,
    namespace: &str,
    wql: &str,
) -> Result<(WsmanClient<Session>, QueryContext)> {
    debug!(host = %conn.hostname, wql, "running query");
    let mut client = connect(conn).await?;
    let mut ctx = QueryContext::new(&mut client, namespace, wql).await?;
    ctx.run(&mut client).await?;
    Ok((client, ctx))
}

/// Materialize the typed instance set of a finished query.
fn instance_set(ctx: &QueryContext) -> Result<ClassInstanceSet> {
    let schema = ClassSchema::from_document(ctx.schema())?;
    let response = ctx
        .response()
        .ok_or_else(|| WrError::Protocol("response from server was empty".to_string()))?;
    ClassInstanceSet::from_document(response, &schema)
}

fn int_prop(instance: &ClassInstance, name: &str) -> Result<i64> {
    instance
        .get(name)
        .and_then(|v| v.as_integer())
        .ok_or_else(|| WrError::Schema(format!("property {name} has no integer value")))
}

fn str_prop(instance: &ClassInstance, name: &str) -> Result<String> {
    instance
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| WrError::Schema(format!("property {name} has no string value")))
}

fn percent(part: i64, whole: i64) -> i64 {
    if whole <= 0 {
        0
    } else {
        part * 100 / whole
    }
}

// ============================================================================
// cpu
// ============================================================================

#[derive(Args, Debug)]
pub struct CpuArgs {
    #[command(flatten)]
    pub conn: ConnectionArgs,
    #[command(flatten)]
    pub thresholds: ThresholdArgs,
}

impl CpuArgs {
    pub async fn execute(&self) -> CheckStatus {
        run_with_timeout(self.conn.timeout, self.check()).await
    }

    async fn check(&self) -> Result<CheckStatus> {
        let wql = "SELECT * FROM Win32_PerfFormattedData_Counters_ProcessorInformation \
                   WHERE Name='_total'";
        let (_client, ctx) = open_query(&self.conn, NAMESPACE, wql).await?;

        let load = ctx.get_integer("PercentProcessorTime")?;
        let status = classify(load, self.thresholds.warning, self.thresholds.critical);

        let mut perfdata = vec![Perfdata::new("load", load)
            .thresholds(self.thresholds.warning, self.thresholds.critical)
            .range(0, 100)];
        for (label, property) in [
            ("idle_time_percent", "PercentIdleTime"),
            ("user_time_percent", "PercentUserTime"),
            ("privileged_time_percent", "PercentPrivilegedTime"),
            ("interrupt_time_percent", "PercentInterruptTime"),
        ] {
            perfdata.push(Perfdata::new(label, ctx.get_integer(property)?).range(0, 100));
        }

        println!(
            "{}",
            status_line(status, &format!("CPU Usage {load}%"), &perfdata)
        );
        Ok(status)
    }
}

// ============================================================================
// memory
// ============================================================================

#[derive(Args, Debug)]
pub struct MemoryArgs {
    #[command(flatten)]
    pub conn: ConnectionArgs,
    #[command(flatten)]
    pub thresholds: ThresholdArgs,
}

impl MemoryArgs {
    pub async fn execute(&self) -> CheckStatus {
        run_with_timeout(self.conn.timeout, self.check()).await
    }

    async fn check(&self) -> Result<CheckStatus> {
        let (_client, ctx) =
            open_query(&self.conn, NAMESPACE, "SELECT * FROM Win32_OperatingSystem").await?;

        // Values are reported in kilobytes.
        let total = ctx.get_integer("TotalVisibleMemorySize")?;
        let free = ctx.get_integer("FreePhysicalMemory")?;
        let used = total - free;
        let used_pct = percent(used, total);
        let status = classify(used_pct, self.thresholds.warning, self.thresholds.critical);

        let text = format!(
            "Physical Memory: Total: {}MB - Used: {}MB ({}%) - Free {}MB ({}%)",
            total / 1024,
            used / 1024,
            used_pct,
            free / 1024,
            percent(free, total)
        );
        let perfdata = [Perfdata::new("physical_memory_used_percent", used_pct)
            .thresholds(self.thresholds.warning, self.thresholds.critical)
            .range(0, 100)];

        println!("{}", status_line(status, &text, &perfdata));
        Ok(status)
    }
}

// ============================================================================
// disk
// ============================================================================

#[derive(Args, Debug)]
pub struct DiskArgs {
    #[command(flatten)]
    pub conn: ConnectionArgs,
    #[command(flatten)]
    pub thresholds: ThresholdArgs,
}

impl DiskArgs {
    pub async fn execute(&self) -> CheckStatus {
        run_with_timeout(self.conn.timeout, self.check()).await
    }

    async fn check(&self) -> Result<CheckStatus> {
        let wql = "SELECT * FROM Win32_LogicalDisk WHERE DriveType = 3";
        let (_client, ctx) = open_query(&self.conn, NAMESPACE, wql).await?;
        let disks = instance_set(&ctx)?;
        if disks.is_empty() {
            println!("UNKNOWN - no local disks returned");
            return Ok(CheckStatus::Unknown);
        }

        let mut status = CheckStatus::Ok;
        let mut summaries = Vec::new();
        let mut perfdata = Vec::new();
        for disk in &disks {
            let caption = str_prop(disk, "Caption")?;
            let size = int_prop(disk, "Size")?;
            let free = int_prop(disk, "FreeSpace")?;
            let used_pct = percent(size - free, size);

            status = status.worsen(classify(
                used_pct,
                self.thresholds.warning,
                self.thresholds.critical,
            ));
            summaries.push(format!("{caption} {used_pct}% used"));
            perfdata.push(
                Perfdata::new(format!("{caption}_used_percent"), used_pct)
                    .thresholds(self.thresholds.warning, self.thresholds.critical)
                    .range(0, 100),
            );
            perfdata.push(
                Perfdata::new(format!("{caption}_free"), free / (1024 * 1024)).uom("MB"),
            );
        }

        println!(
            "{}",
            status_line(status, &format!("Disks: {}", summaries.join(", ")), &perfdata)
        );
        Ok(status)
    }
}

// ============================================================================
// service
// ============================================================================

#[derive(Args, Debug)]
pub struct ServiceArgs {
    #[command(flatten)]
    pub conn: ConnectionArgs,
    #[command(flatten)]
    pub thresholds: ThresholdArgs,

    /// Only count services whose name or display name matches
    #[arg(short = 'i', long)]
    pub include: Option<String>,

    /// Ignore services whose name or display name matches
    #[arg(short = 'x', long)]
    pub exclude: Option<String>,
}

impl ServiceArgs {
    pub async fn execute(&self) -> CheckStatus {
        run_with_timeout(self.conn.timeout, self.check()).await
    }

    async fn check(&self) -> Result<CheckStatus> {
        let include = compile_filter(self.include.as_deref())?;
        let exclude = compile_filter(self.exclude.as_deref())?;

        let (_client, ctx) =
            open_query(&self.conn, NAMESPACE, "SELECT * FROM Win32_Service").await?;
        let services = instance_set(&ctx)?;

        let mut running = 0i64;
        let mut stopped = 0i64;
        let mut details = Vec::new();
        for service in &services {
            let name = str_prop(service, "Name")?;
            let display_name = str_prop(service, "DisplayName")?;
            let state = str_prop(service, "State")?;

            let included = match &include {
                Some(re) => re.is_match(&name) || re.is_match(&display_name),
                None => true,
            };
            let excluded = match &exclude {
                Some(re) => re.is_match(&name) || re.is_match(&display_name),
                None => false,
            };
            if !included || excluded {
                continue;
            }

            if state == "Running" {
                running += 1;
            } else {
                stopped += 1;
                details.push(format!("** {state} - {display_name}({name})"));
            }
        }

        let status = classify(stopped, self.thresholds.warning, self.thresholds.critical);
        let perfdata = [
            Perfdata::new("stopped", stopped)
                .thresholds(self.thresholds.warning, self.thresholds.critical),
            Perfdata::new("running", running),
        ];
        println!(
            "{}",
            status_line(
                status,
                &format!("Services running={running} stopped={stopped}"),
                &perfdata
            )
        );
        for line in details {
            println!("{line}");
        }
        Ok(status)
    }
}

fn compile_filter(pattern: Option<&str>) -> Result<Option<Regex>> {
    pattern
        .map(|p| {
            Regex::new(p)
                .map_err(|e| WrError::InvalidConfig(format!("invalid filter pattern: {e}")))
        })
        .transpose()
}

// ============================================================================
// uptime
// ============================================================================

#[derive(Args, Debug)]
pub struct UptimeArgs {
    #[command(flatten)]
    pub conn: ConnectionArgs,
    #[command(flatten)]
    pub thresholds: ThresholdArgs,
}

impl UptimeArgs {
    pub async fn execute(&self) -> CheckStatus {
        run_with_timeout(self.conn.timeout, self.check()).await
    }

    async fn check(&self) -> Result<CheckStatus> {
        let (_client, ctx) =
            open_query(&self.conn, NAMESPACE, "SELECT * FROM Win32_OperatingSystem").await?;

        let last_boot = ctx.get_string("LastBootUpTime")?;
        let boot_time = parse_cim_datetime(&last_boot)?;
        let uptime_hours = (chrono::Utc::now().timestamp() - boot_time.timestamp()) / 3600;

        let status = classify(
            uptime_hours,
            self.thresholds.warning,
            self.thresholds.critical,
        );
        let perfdata = [Perfdata::new("uptime", uptime_hours)
            .uom("h")
            .thresholds(self.thresholds.warning, self.thresholds.critical)];
        println!(
            "{}",
            status_line(
                status,
                &format!("Uptime of server is {uptime_hours} Hours"),
                &perfdata
            )
        );
        Ok(status)
    }
}

// ============================================================================
// pagefile
// ============================================================================

#[derive(Args, Debug)]
pub struct PagefileArgs {
    #[command(flatten)]
    pub conn: ConnectionArgs,
    #[command(flatten)]
    pub thresholds: ThresholdArgs,
}

impl PagefileArgs {
    pub async fn execute(&self) -> CheckStatus {
        run_with_timeout(self.conn.timeout, self.check()).await
    }

    async fn check(&self) -> Result<CheckStatus> {
        let (_client, ctx) =
            open_query(&self.conn, NAMESPACE, "SELECT * FROM Win32_PageFileUsage").await?;
        let pagefiles = instance_set(&ctx)?;
        if pagefiles.is_empty() {
            println!("UNKNOWN - no page files returned");
            return Ok(CheckStatus::Unknown);
        }

        let mut status = CheckStatus::Ok;
        let mut summaries = Vec::new();
        let mut perfdata = Vec::new();
        for pagefile in &pagefiles {
            let caption = str_prop(pagefile, "Caption")?;
            let allocated = int_prop(pagefile, "AllocatedBaseSize")?;
            let current = int_prop(pagefile, "CurrentUsage")?;
            let peak = int_prop(pagefile, "PeakUsage")?;
            let used_pct = percent(current, allocated);

            status = status.worsen(classify(
                used_pct,
                self.thresholds.warning,
                self.thresholds.critical,
            ));
            summaries.push(format!("{caption} {used_pct}% used"));
            perfdata.push(
                Perfdata::new(format!("{caption}_used_percent"), used_pct)
                    .thresholds(self.thresholds.warning, self.thresholds.critical)
                    .range(0, 100),
            );
            perfdata.push(Perfdata::new(format!("{caption}_used"), current).uom("MB"));
            perfdata.push(Perfdata::new(format!("{caption}_peak"), peak).uom("MB"));
        }

        println!(
            "{}",
            status_line(
                status,
                &format!("Page files: {}", summaries.join(", ")),
                &perfdata
            )
        );
        Ok(status)
    }
}

// ============================================================================
// wql / schema
// ============================================================================

#[derive(Args, Debug)]
pub struct WqlArgs {
    #[command(flatten)]
    pub conn: ConnectionArgs,

    /// WMI namespace to query
    #[arg(short = 'n', long, default_value = NAMESPACE)]
    pub namespace: String,

    /// WQL query, in quotes
    #[arg(short = 'q', long)]
    pub query: String,

    /// Print the raw aggregated response XML instead of typed values
    #[arg(long)]
    pub raw: bool,
}

impl WqlArgs {
    pub async fn execute(&self) -> CheckStatus {
        run_with_timeout(self.conn.timeout, self.run()).await
    }

    async fn run(&self) -> Result<CheckStatus> {
        let (_client, ctx) = open_query(&self.conn, &self.namespace, &self.query).await?;

        if self.raw {
            let response = ctx
                .response()
                .ok_or_else(|| WrError::Protocol("response from server was empty".to_string()))?;
            println!("{}", response.to_xml()?);
        } else {
            for instance in &instance_set(&ctx)? {
                print!("{instance}");
            }
        }
        Ok(CheckStatus::Ok)
    }
}

#[derive(Args, Debug)]
pub struct SchemaArgs {
    #[command(flatten)]
    pub conn: ConnectionArgs,

    /// WMI namespace the class lives in
    #[arg(short = 'n', long, default_value = NAMESPACE)]
    pub namespace: String,

    /// CIM class name
    #[arg(short = 'C', long)]
    pub class: String,
}

impl SchemaArgs {
    pub async fn execute(&self) -> CheckStatus {
        run_with_timeout(self.conn.timeout, self.run()).await
    }

    async fn run(&self) -> Result<CheckStatus> {
        let mut client = connect(&self.conn).await?;
        let schema: Document = client.get_cim_schema(&self.namespace, &self.class).await?;
        println!("{}", schema.to_xml()?);
        Ok(CheckStatus::Ok)
    }
}
