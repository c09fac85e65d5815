/*!
pdsnap CLI - inspect and rewrite persistent-disk volume identities.

Operators use this to check what the backup orchestrator will see for a given
persistent volume: its volume ID, the handle a restore would write back, the
region of a zone token, or the tags a snapshot would carry.
*/

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use pdsnap_core::{
    config::{CREDENTIALS_FILE_KEY, PROJECT_KEY, SNAPSHOT_LOCATION_KEY, VOLUME_PROJECT_KEY},
    observability::init_observability,
    restore_disk_name, VolumeIdentity, VolumeIdentityCodec, VolumeSnapshotter, ZoneToken,
};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use tabled::{Table, Tabled};
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "pdsnap")]
#[command(about = "Inspect and rewrite persistent-disk volume identities")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Snapshotter configuration, mirroring the orchestrator's config map
#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// Project where snapshots are created
    #[arg(long, global = true, env = "PDSNAP_PROJECT")]
    project: Option<String>,

    /// Project owning the volumes; restored CSI handles are rewritten into it
    #[arg(long, global = true, env = "PDSNAP_VOLUME_PROJECT")]
    volume_project: Option<String>,

    /// Snapshot location label
    #[arg(long, global = true, env = "PDSNAP_SNAPSHOT_LOCATION")]
    snapshot_location: Option<String>,

    /// Service account credentials file (defaults to GOOGLE_APPLICATION_CREDENTIALS)
    #[arg(long, global = true)]
    credentials_file: Option<PathBuf>,
}

impl ConfigArgs {
    fn to_map(&self) -> HashMap<String, String> {
        let mut config = HashMap::new();
        let entries = [
            (PROJECT_KEY, self.project.clone()),
            (VOLUME_PROJECT_KEY, self.volume_project.clone()),
            (SNAPSHOT_LOCATION_KEY, self.snapshot_location.clone()),
            (
                CREDENTIALS_FILE_KEY,
                self.credentials_file
                    .as_ref()
                    .map(|p| p.to_string_lossy().to_string()),
            ),
        ];
        for (key, value) in entries {
            if let Some(value) = value {
                config.insert(key.to_string(), value);
            }
        }
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the volume ID of a persistent volume
    VolumeId {
        /// Persistent volume JSON file, or `-` for stdin
        pv: String,
    },
    /// Print a persistent volume rewritten to reference another disk
    SetVolumeId {
        /// Persistent volume JSON file, or `-` for stdin
        pv: String,
        /// New volume ID
        #[arg(required_unless_present = "generate")]
        volume_id: Option<String>,
        /// Generate a restore disk name instead
        #[arg(short, long, conflicts_with = "volume_id")]
        generate: bool,
    },
    /// Show the identity of a persistent volume
    Inspect {
        /// Persistent volume JSON file, or `-` for stdin
        pv: String,
    },
    /// Parse zone tokens into regions
    Region {
        /// Zone tokens, e.g. `us-central1-a` or `us-central1-a__us-central1-b`
        #[arg(required = true)]
        zones: Vec<String>,
    },
    /// Compute the tags a snapshot would carry
    Tags {
        /// Operator tag as KEY=VALUE (repeatable)
        #[arg(short, long = "tag", value_parser = parse_tag)]
        tags: Vec<(String, String)>,
        /// Disk description field
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Report whether a volume handle belongs to another project
    CrossProject {
        /// CSI volume handle
        handle: String,
    },
}

#[derive(Tabled)]
struct ZoneInfo {
    #[tabled(rename = "Zone")]
    zone: String,
    #[tabled(rename = "Region")]
    region: String,
    #[tabled(rename = "Multi-zone")]
    multi_zone: bool,
    #[tabled(rename = "Replica zones")]
    replica_zones: String,
}

#[derive(Tabled)]
struct IdentityField {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_observability(cli.json_logs, cli.verbose)?;

    let snapshotter = VolumeSnapshotter::init(&cli.config.to_map())?;
    debug!(config = ?snapshotter.config(), "Snapshotter configured");

    match cli.command {
        Commands::VolumeId { pv } => print_volume_id(&snapshotter, &pv)?,
        Commands::SetVolumeId {
            pv,
            volume_id,
            generate,
        } => {
            let volume_id = match volume_id {
                Some(id) if !generate => id,
                _ => restore_disk_name(),
            };
            print_updated_volume(&snapshotter, &pv, &volume_id)?
        }
        Commands::Inspect { pv } => inspect_volume(&snapshotter, &pv)?,
        Commands::Region { zones } => print_regions(&snapshotter, &zones)?,
        Commands::Tags { tags, description } => {
            println!("{}", snapshotter.snapshot_tags(tags, &description));
        }
        Commands::CrossProject { handle } => {
            let cross_project = snapshotter.is_volume_created_cross_projects(&handle);
            info!(handle = %handle, cross_project, "Checked volume project");
            println!("{cross_project}");
        }
    }

    Ok(())
}

fn print_volume_id(codec: &dyn VolumeIdentityCodec, source: &str) -> Result<(), anyhow::Error> {
    let pv = read_persistent_volume(source)?;
    let volume_id = codec.get_volume_id(&pv)?;

    if volume_id.is_empty() {
        warn!("Volume is not provisioned as a persistent disk");
    }
    println!("{volume_id}");
    Ok(())
}

fn print_updated_volume(
    codec: &dyn VolumeIdentityCodec,
    source: &str,
    volume_id: &str,
) -> Result<(), anyhow::Error> {
    let pv = read_persistent_volume(source)?;
    let updated = codec.set_volume_id(&pv, volume_id)?;
    info!(volume_id = %volume_id, "Rewrote persistent volume");
    println!("{}", serde_json::to_string_pretty(&updated)?);
    Ok(())
}

fn inspect_volume(snapshotter: &VolumeSnapshotter, source: &str) -> Result<(), anyhow::Error> {
    let pv = read_persistent_volume(source)?;
    let identity = VolumeIdentity::inspect(&pv)?;

    let mut rows = vec![
        IdentityField {
            field: "Scheme",
            value: identity.scheme.clone(),
        },
        IdentityField {
            field: "Volume ID",
            value: or_dash(Some(identity.volume_id.clone())),
        },
        IdentityField {
            field: "Driver",
            value: or_dash(identity.driver.clone()),
        },
        IdentityField {
            field: "Project",
            value: or_dash(identity.project.clone()),
        },
        IdentityField {
            field: "Zone",
            value: or_dash(identity.zone.clone()),
        },
    ];

    if let Some(handle) = pv.pointer("/spec/csi/volumeHandle").and_then(Value::as_str) {
        if identity.project.is_some() {
            rows.push(IdentityField {
                field: "Cross-project",
                value: snapshotter
                    .is_volume_created_cross_projects(handle)
                    .to_string(),
            });
        }
    }

    println!("{}", Table::new(rows));
    Ok(())
}

fn print_regions(snapshotter: &VolumeSnapshotter, zones: &[String]) -> Result<(), anyhow::Error> {
    let mut rows = Vec::new();
    let mut failed = 0;

    for zone in zones {
        match ZoneToken::parse(zone) {
            Ok(token) => {
                let replica_zones = match snapshotter.replica_zones(zone) {
                    Ok(urls) if !urls.is_empty() => urls.join(", "),
                    Ok(_) => "-".to_string(),
                    Err(e) => {
                        debug!(error = %e, "Replica zones unavailable");
                        "-".to_string()
                    }
                };
                rows.push(ZoneInfo {
                    zone: zone.clone(),
                    multi_zone: token.is_multi_zone(),
                    region: token.region,
                    replica_zones,
                });
            }
            Err(e) => {
                warn!("{}", e);
                failed += 1;
            }
        }
    }

    if !rows.is_empty() {
        println!("{}", Table::new(rows));
    }

    if failed > 0 {
        return Err(anyhow!("{failed} zone token(s) could not be parsed"));
    }
    Ok(())
}

fn read_persistent_volume(source: &str) -> Result<Value, anyhow::Error> {
    let raw = if source == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read persistent volume from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read persistent volume from {source}"))?
    };

    serde_json::from_str(&raw).with_context(|| format!("{source} is not valid JSON"))
}

fn parse_tag(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

fn or_dash(value: Option<String>) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => "-".to_string(),
    }
}
