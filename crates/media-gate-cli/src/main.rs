// crates/media-gate-cli/src/main.rs
// ============================================================================
// Module: Media Gate CLI Entry Point
// Description: Command dispatcher for governance maintenance and admin tasks.
// Purpose: Run the scheduler loop and expose block, quota, and settings admin.
// Dependencies: clap, media-gate-config, media-gate-core, media-gate-store-sqlite,
// serde, serde_jcs, serde_json, thiserror, tokio.
// ============================================================================

//! ## Overview
//! The Media Gate CLI wires the `SQLite` governance store, the configured audit
//! sink, and the host probe into the core runtime. `serve` runs the scheduled
//! maintenance loop until interrupted; the remaining subcommands are one-shot
//! admin and diagnostic operations. Every command prints canonical JSON to
//! stdout. Admission checks exit with status 2 when the request is denied.
//! Security posture: arguments and headers are untrusted input.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use media_gate_config::MediaGateConfig;
use media_gate_core::AbuseGuard;
use media_gate_core::AbuseKind;
use media_gate_core::AbuseWatchdog;
use media_gate_core::AccountQuota;
use media_gate_core::AccountTier;
use media_gate_core::Admission;
use media_gate_core::BlockedBy;
use media_gate_core::ClientId;
use media_gate_core::Gatekeeper;
use media_gate_core::GovernanceContext;
use media_gate_core::GovernanceStores;
use media_gate_core::HeavyTool;
use media_gate_core::HostSystemProbe;
use media_gate_core::IncidentFilter;
use media_gate_core::MaintenanceRunner;
use media_gate_core::RateLimiter;
use media_gate_core::ReasonCode;
use media_gate_core::RequestOrigin;
use media_gate_core::SettingRecord;
use media_gate_core::SettingType;
use media_gate_core::SettingValue;
use media_gate_core::StoreError;
use media_gate_core::SystemProbe;
use media_gate_core::UserId;
use media_gate_core::Verdict;
use media_gate_core::runtime::resolve_client_ip;
use media_gate_core::seed_records;
use media_gate_store_sqlite::SqliteGovernanceStore;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::time::MissedTickBehavior;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Exit status for admission checks that were denied.
const DENIED_EXIT_STATUS: u8 = 2;

/// Default row limit for listing commands.
const DEFAULT_LIST_LIMIT: &str = "100";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Media Gate command-line interface.
#[derive(Parser, Debug)]
#[command(name = "media-gate", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Optional config file path (defaults to media-gate.toml or `MEDIA_GATE_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the maintenance scheduler until interrupted.
    Serve,
    /// Run one maintenance pass and print its report.
    Maintenance,
    /// Run one abuse watchdog pass.
    Watchdog,
    /// Print the server health snapshot.
    Health,
    /// Block an identifier.
    Block(BlockCommand),
    /// Remove a block.
    Unblock {
        /// Blocked identifier.
        identifier: String,
    },
    /// List blocked identifiers, newest first.
    Blocked {
        /// Maximum rows to print.
        #[arg(long, default_value = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },
    /// List logged abuse incidents, newest first.
    Incidents(IncidentsCommand),
    /// Print aggregate abuse statistics.
    AbuseStats,
    /// List live rate-limit windows.
    RateLimits {
        /// Maximum rows to print.
        #[arg(long, default_value = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },
    /// Governance settings utilities.
    Settings {
        /// Selected settings subcommand.
        #[command(subcommand)]
        command: SettingsCommand,
    },
    /// User account utilities.
    Account {
        /// Selected account subcommand.
        #[command(subcommand)]
        command: AccountCommand,
    },
    /// Evaluate upload admission for a request and record the rate-limit hit.
    CheckUpload(CheckUploadCommand),
    /// Evaluate heavy-tool admission for a request and record the rate-limit hit.
    CheckTool(CheckToolCommand),
}

/// Arguments for `block`.
#[derive(Args, Debug)]
struct BlockCommand {
    /// Identifier to block (client address or synthetic identifier).
    identifier: String,
    /// Reason recorded with the block.
    #[arg(long, default_value = "Manual block")]
    reason: String,
    /// Block duration in hours; zero blocks permanently. Defaults to the
    /// `abuse_block_duration_hours` setting.
    #[arg(long, value_name = "HOURS")]
    hours: Option<u32>,
}

/// Arguments for `incidents`.
#[derive(Args, Debug)]
struct IncidentsCommand {
    /// Restrict to one incident kind.
    #[arg(long, value_parser = parse_abuse_kind)]
    kind: Option<AbuseKind>,
    /// Restrict to one identifier.
    #[arg(long)]
    identifier: Option<String>,
    /// Maximum rows to print.
    #[arg(long, default_value = DEFAULT_LIST_LIMIT)]
    limit: usize,
}

/// Settings subcommands.
#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Insert default settings for keys that are not yet present.
    Seed,
    /// Print every stored setting.
    List,
    /// Print one setting.
    Get {
        /// Setting key.
        key: String,
    },
    /// Write one setting.
    Set {
        /// Setting key.
        key: String,
        /// Raw value.
        value: String,
        /// Declared value type; inferred from the raw value when omitted.
        #[arg(long = "type", value_enum, value_name = "TYPE")]
        setting_type: Option<SettingTypeArg>,
    },
}

/// Account subcommands.
#[derive(Subcommand, Debug)]
enum AccountCommand {
    /// Create an account or change its tier.
    Set {
        /// User identifier.
        user: u64,
        /// Account tier.
        #[arg(long, value_enum)]
        tier: TierArg,
    },
    /// Print quota usage for a user.
    Stats {
        /// User identifier.
        user: u64,
    },
}

/// Request origin shared by admission checks.
#[derive(Args, Debug, Default)]
struct OriginArgs {
    /// Direct peer address of the request.
    #[arg(long, value_name = "ADDR")]
    client: Option<String>,
    /// Forwarding header in `Name: value` form; repeatable.
    #[arg(long = "header", value_name = "HEADER")]
    headers: Vec<String>,
    /// Signed-in user identifier.
    #[arg(long, value_name = "ID")]
    user: Option<u64>,
}

/// Arguments for `check-upload`.
#[derive(Args, Debug)]
struct CheckUploadCommand {
    /// Request origin.
    #[command(flatten)]
    origin: OriginArgs,
    /// Upload size in bytes.
    #[arg(long, value_name = "BYTES")]
    size: u64,
    /// Record the completed upload when admission succeeds.
    #[arg(long, action = ArgAction::SetTrue)]
    record: bool,
}

/// Arguments for `check-tool`.
#[derive(Args, Debug)]
struct CheckToolCommand {
    /// Request origin.
    #[command(flatten)]
    origin: OriginArgs,
    /// Heavy tool to admit.
    #[arg(long, value_parser = parse_heavy_tool)]
    tool: HeavyTool,
}

/// Setting type labels accepted on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SettingTypeArg {
    /// Signed integer.
    Int,
    /// Boolean (`true`/`false`/`1`/`0`).
    Bool,
    /// JSON document.
    Json,
    /// Free-form string.
    String,
}

impl From<SettingTypeArg> for SettingType {
    fn from(value: SettingTypeArg) -> Self {
        match value {
            SettingTypeArg::Int => Self::Int,
            SettingTypeArg::Bool => Self::Bool,
            SettingTypeArg::Json => Self::Json,
            SettingTypeArg::String => Self::String,
        }
    }
}

/// Account tier labels accepted on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum TierArg {
    /// Free plan.
    Free,
    /// Paid plan.
    Premium,
}

impl From<TierArg> for AccountTier {
    fn from(value: TierArg) -> Self {
        match value {
            TierArg::Free => Self::Free,
            TierArg::Premium => Self::Premium,
        }
    }
}

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Output Types
// ============================================================================

/// Admission check result printed by `check-upload` and `check-tool`.
#[derive(Debug, Serialize)]
struct AdmissionOutput {
    /// Resolved client identifier.
    client: ClientId,
    /// Signed-in user, if any.
    user_id: Option<UserId>,
    /// HTTP status a front end would map the verdict to.
    http_status: u16,
    /// Admission verdict.
    verdict: Verdict,
    /// Rate-limit headers for the response.
    headers: BTreeMap<String, String>,
    /// Whether the upload was recorded (only with `--record`).
    #[serde(skip_serializing_if = "Option::is_none")]
    recorded: Option<bool>,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Parses arguments and dispatches the selected subcommand.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    if cli.show_version {
        let version = format!("media-gate {}", env!("CARGO_PKG_VERSION"));
        write_stdout_line(&version).map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }
    let Some(command) = cli.command else {
        return Err(CliError::new("no command provided; run with --help".to_string()));
    };
    let runtime = Runtime::open(cli.config.as_deref())?;
    dispatch(&runtime, command).await
}

/// Routes a parsed subcommand to its handler.
async fn dispatch(runtime: &Runtime, command: Commands) -> CliResult<ExitCode> {
    match command {
        Commands::Serve => command_serve(runtime).await,
        Commands::Maintenance => command_maintenance(runtime),
        Commands::Watchdog => command_watchdog(runtime),
        Commands::Health => write_json(&runtime.gatekeeper().server_health()),
        Commands::Block(command) => command_block(runtime, command),
        Commands::Unblock {
            identifier,
        } => command_unblock(runtime, &identifier),
        Commands::Blocked {
            limit,
        } => {
            let blocked = runtime.guard().list_blocked(limit).map_err(store_error("list blocks"))?;
            write_json(&json!({ "blocked": blocked }))
        }
        Commands::Incidents(command) => command_incidents(runtime, command),
        Commands::AbuseStats => {
            let stats = runtime.guard().abuse_stats().map_err(store_error("abuse stats"))?;
            write_json(&stats)
        }
        Commands::RateLimits {
            limit,
        } => {
            let limiter = RateLimiter::new(runtime.ctx.clone(), runtime.config.rate_limit.policy());
            let entries = limiter.entries(limit).map_err(store_error("list rate windows"))?;
            write_json(&json!({ "entries": entries }))
        }
        Commands::Settings {
            command,
        } => command_settings(runtime, command),
        Commands::Account {
            command,
        } => command_account(runtime, command),
        Commands::CheckUpload(command) => command_check_upload(runtime, &command),
        Commands::CheckTool(command) => command_check_tool(runtime, &command),
    }
}

// ============================================================================
// SECTION: Runtime Wiring
// ============================================================================

/// Loaded config plus the governance context built from it.
struct Runtime {
    /// Validated configuration.
    config: MediaGateConfig,
    /// Shared governance context over the `SQLite` store.
    ctx: GovernanceContext,
}

impl Runtime {
    /// Loads config, opens the store, and builds the audit sink.
    fn open(config_path: Option<&Path>) -> CliResult<Self> {
        let config = MediaGateConfig::load(config_path)
            .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
        let store = SqliteGovernanceStore::new(config.store.sqlite_config())
            .map_err(|err| CliError::new(format!("failed to open store: {err}")))?;
        let audit = config
            .audit
            .build_sink()
            .map_err(|err| CliError::new(format!("failed to open audit sink: {err}")))?;
        let ctx = GovernanceContext::new(GovernanceStores::from_shared(Arc::new(store)))
            .with_audit(audit);
        Ok(Self {
            config,
            ctx,
        })
    }

    /// Host probe configured from the `[probes]` section.
    fn probe(&self) -> Arc<dyn SystemProbe> {
        Arc::new(HostSystemProbe::new(
            self.config.probes.worker_process.clone(),
            self.config.probes.disk_path.clone(),
        ))
    }

    /// Gatekeeper over the shared context and host probe.
    fn gatekeeper(&self) -> Gatekeeper {
        Gatekeeper::new(self.ctx.clone(), self.probe())
    }

    /// Abuse guard over the shared context.
    fn guard(&self) -> AbuseGuard {
        AbuseGuard::new(self.ctx.clone())
    }

    /// Admission chain with the configured rate-limit policy.
    fn admission(&self) -> Admission {
        Admission::new(&self.ctx, self.config.rate_limit.policy(), self.probe())
    }

    /// Maintenance runner rooted at the configured temp directory.
    fn maintenance_runner(&self) -> MaintenanceRunner {
        MaintenanceRunner::new(
            &self.ctx,
            self.config.rate_limit.policy(),
            self.config.temp_files.root.clone(),
        )
    }
}

// ============================================================================
// SECTION: Scheduler Commands
// ============================================================================

/// Runs maintenance and rate-window sweeps on their intervals until Ctrl-C.
async fn command_serve(runtime: &Runtime) -> CliResult<ExitCode> {
    let scheduler = runtime.config.scheduler;
    let runner = runtime.maintenance_runner();
    let mut maintenance =
        tokio::time::interval(Duration::from_secs(scheduler.maintenance_interval_secs));
    maintenance.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sweep = tokio::time::interval(Duration::from_secs(scheduler.rate_sweep_interval_secs));
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                signal.map_err(|err| {
                    CliError::new(format!("failed to listen for shutdown signal: {err}"))
                })?;
                return Ok(ExitCode::SUCCESS);
            }
            _ = maintenance.tick() => {
                let pass = runner.clone();
                let report = tokio::task::spawn_blocking(move || pass.run_once())
                    .await
                    .map_err(|err| CliError::new(format!("maintenance task failed: {err}")))?;
                write_json(&report)?;
            }
            _ = sweep.tick() => {
                let pass = runner.clone();
                let swept = tokio::task::spawn_blocking(move || pass.sweep_rate_windows())
                    .await
                    .map_err(|err| CliError::new(format!("rate sweep task failed: {err}")))?;
                if let Err(err) = swept {
                    write_stderr_line(&format!("rate window sweep failed: {err}"))
                        .map_err(|err| CliError::new(output_error("stderr", &err)))?;
                }
            }
        }
    }
}

/// Runs one maintenance pass; exits non-zero when any task failed.
fn command_maintenance(runtime: &Runtime) -> CliResult<ExitCode> {
    let report = runtime.maintenance_runner().run_once();
    write_json(&report)?;
    Ok(if report.is_clean() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Runs one watchdog pass and prints its report.
fn command_watchdog(runtime: &Runtime) -> CliResult<ExitCode> {
    let report = AbuseWatchdog::new(runtime.ctx.clone()).run().map_err(store_error("watchdog"))?;
    write_json(&report)
}

// ============================================================================
// SECTION: Abuse Commands
// ============================================================================

/// Blocks an identifier as an admin action.
fn command_block(runtime: &Runtime, command: BlockCommand) -> CliResult<ExitCode> {
    let identifier = non_empty_identifier(&command.identifier)?;
    let entry = runtime
        .guard()
        .block(&identifier, &command.reason, command.hours, BlockedBy::Admin)
        .map_err(store_error("block"))?;
    write_json(&entry)
}

/// Removes a block and reports whether one existed.
fn command_unblock(runtime: &Runtime, identifier: &str) -> CliResult<ExitCode> {
    let identifier = non_empty_identifier(identifier)?;
    let removed = runtime.guard().unblock(&identifier).map_err(store_error("unblock"))?;
    write_json(&json!({ "identifier": identifier, "removed": removed }))
}

/// Lists incidents matching the filter arguments.
fn command_incidents(runtime: &Runtime, command: IncidentsCommand) -> CliResult<ExitCode> {
    let filter = IncidentFilter {
        kind: command.kind,
        identifier: command.identifier.map(ClientId::new),
        limit: command.limit,
    };
    let incidents = runtime.guard().incidents(&filter).map_err(store_error("list incidents"))?;
    write_json(&json!({ "incidents": incidents }))
}

// ============================================================================
// SECTION: Settings and Accounts
// ============================================================================

/// Dispatches settings subcommands against the settings store.
fn command_settings(runtime: &Runtime, command: SettingsCommand) -> CliResult<ExitCode> {
    let settings = &runtime.ctx.stores.settings;
    match command {
        SettingsCommand::Seed => {
            let inserted =
                settings.seed_settings(&seed_records()).map_err(store_error("seed settings"))?;
            write_json(&json!({ "inserted": inserted }))
        }
        SettingsCommand::List => {
            let records = settings.load_settings().map_err(store_error("load settings"))?;
            write_json(&json!({ "settings": records }))
        }
        SettingsCommand::Get {
            key,
        } => {
            let value = settings.get_setting(&key).map_err(store_error("read setting"))?;
            let Some(value) = value else {
                return Err(CliError::new(format!("setting not found: {key}")));
            };
            write_json(&SettingRecord::new(key, value))
        }
        SettingsCommand::Set {
            key,
            value,
            setting_type,
        } => {
            let key = key.trim().to_string();
            if key.is_empty() {
                return Err(CliError::new("setting key must be non-empty".to_string()));
            }
            let value = parse_setting_value(&value, setting_type)?;
            if !runtime.gatekeeper().set_setting(&key, value.clone()) {
                return Err(CliError::new(format!("failed to write setting: {key}")));
            }
            write_json(&SettingRecord::new(key, value))
        }
    }
}

/// Dispatches account subcommands.
fn command_account(runtime: &Runtime, command: AccountCommand) -> CliResult<ExitCode> {
    match command {
        AccountCommand::Set {
            user,
            tier,
        } => {
            let account = apply_tier(runtime, UserId::new(user), tier.into())?;
            write_json(&account)
        }
        AccountCommand::Stats {
            user,
        } => {
            let stats = runtime
                .gatekeeper()
                .user_stats(UserId::new(user))
                .map_err(store_error("user stats"))?;
            let Some(stats) = stats else {
                return Err(CliError::new(format!("account not found: {user}")));
            };
            write_json(&stats)
        }
    }
}

/// Creates or re-tiers an account, resetting its storage limit to the tier
/// default while keeping usage counters.
fn apply_tier(runtime: &Runtime, user_id: UserId, tier: AccountTier) -> CliResult<AccountQuota> {
    let limit = runtime.ctx.settings_snapshot().tier_storage_limit(tier);
    let quotas = &runtime.ctx.stores.quotas;
    let existing = quotas.account(user_id).map_err(store_error("read account"))?;
    let account = match existing {
        Some(mut account) => {
            account.tier = tier;
            account.storage_limit = limit;
            account
        }
        None => AccountQuota::new(user_id, tier, limit),
    };
    quotas.upsert_account(&account).map_err(store_error("write account"))?;
    Ok(account)
}

// ============================================================================
// SECTION: Admission Checks
// ============================================================================

/// Evaluates upload admission, optionally recording the upload.
fn command_check_upload(runtime: &Runtime, command: &CheckUploadCommand) -> CliResult<ExitCode> {
    let origin = origin_from_args(&command.origin)?;
    let admission = runtime.admission();
    let verdict = admission.admit_upload(&origin, command.size);
    let recorded = (command.record && verdict.allowed)
        .then(|| admission.complete_upload(&origin, command.size));
    emit_admission(&admission, origin, verdict, recorded)
}

/// Evaluates heavy-tool admission.
fn command_check_tool(runtime: &Runtime, command: &CheckToolCommand) -> CliResult<ExitCode> {
    let origin = origin_from_args(&command.origin)?;
    let admission = runtime.admission();
    let verdict = admission.admit_heavy_tool(&origin, command.tool);
    emit_admission(&admission, origin, verdict, None)
}

/// Prints an admission result and maps denial to [`DENIED_EXIT_STATUS`].
fn emit_admission(
    admission: &Admission,
    origin: RequestOrigin,
    verdict: Verdict,
    recorded: Option<bool>,
) -> CliResult<ExitCode> {
    let limiter = admission.rate_limiter();
    let status = limiter.remaining(&origin.subject());
    let headers = limiter
        .headers(status, verdict.code == ReasonCode::RateLimit)
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
    let allowed = verdict.allowed;
    let output = AdmissionOutput {
        client: origin.client,
        user_id: origin.user_id,
        http_status: verdict.code.http_status(),
        verdict,
        headers,
        recorded,
    };
    write_json(&output)?;
    Ok(if allowed { ExitCode::SUCCESS } else { ExitCode::from(DENIED_EXIT_STATUS) })
}

/// Resolves the request origin from the peer address and forwarding headers.
fn origin_from_args(args: &OriginArgs) -> CliResult<RequestOrigin> {
    let headers = args
        .headers
        .iter()
        .map(String::as_str)
        .map(parse_header)
        .collect::<CliResult<Vec<_>>>()?;
    let client = resolve_client_ip(headers, args.client.as_deref());
    Ok(RequestOrigin {
        client,
        user_id: args.user.map(UserId::new),
    })
}

// ============================================================================
// SECTION: Argument Parsing
// ============================================================================

/// Splits a `Name: value` header argument.
fn parse_header(raw: &str) -> CliResult<(&str, &str)> {
    let Some((name, value)) = raw.split_once(':') else {
        return Err(CliError::new(format!("invalid header (expected `Name: value`): {raw}")));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::new(format!("invalid header (empty name): {raw}")));
    }
    Ok((name, value.trim()))
}

/// Decodes a raw setting value against an explicit type, or infers one.
fn parse_setting_value(raw: &str, setting_type: Option<SettingTypeArg>) -> CliResult<SettingValue> {
    match setting_type {
        None => Ok(SettingValue::infer(raw)),
        Some(setting_type) => SettingValue::decode(setting_type.into(), raw)
            .map_err(|err| CliError::new(format!("invalid setting value: {err}"))),
    }
}

/// Clap value parser for incident kinds.
fn parse_abuse_kind(raw: &str) -> Result<AbuseKind, String> {
    AbuseKind::parse(raw).ok_or_else(|| {
        format!(
            "unknown abuse kind `{raw}` (expected upload_spam, api_abuse, brute_force, \
             suspicious_content, or bandwidth_abuse)"
        )
    })
}

/// Clap value parser for heavy tools (accepts the `rembg` alias).
fn parse_heavy_tool(raw: &str) -> Result<HeavyTool, String> {
    HeavyTool::parse(raw).ok_or_else(|| format!("unknown tool `{raw}` (expected ocr or removebg)"))
}

/// Trims an identifier argument and rejects empty input.
fn non_empty_identifier(raw: &str) -> CliResult<ClientId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CliError::new("identifier must be non-empty".to_string()));
    }
    Ok(ClientId::new(trimmed))
}

/// Wraps a store failure with the operation that hit it.
fn store_error(operation: &'static str) -> impl Fn(StoreError) -> CliError {
    move |err| CliError::new(format!("{operation} failed: {err}"))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes canonical JSON plus a newline to stdout.
fn write_json<T: Serialize>(value: &T) -> CliResult<ExitCode> {
    let mut bytes = serde_jcs::to_vec(value)
        .map_err(|err| CliError::new(format!("failed to encode output: {err}")))?;
    bytes.push(b'\n');
    write_stdout_bytes(&bytes).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes raw bytes to stdout without adding a newline.
fn write_stdout_bytes(bytes: &[u8]) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(bytes)
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output stream failure.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
