//! CLI argument definitions using clap
//!
//! Commands:
//! - smartdrive generate-recovery-kit [--volume <path>] [--keyfile <path>]
//! - smartdrive recover [--volume <path>] [--mount-target <target>]
//! - smartdrive reconstruct <chunk-file> [--output <path>]
//! - smartdrive validate-target --disk <n> [--script <path>]
//! - smartdrive check-layout [--disk <n>]
//! - smartdrive status
//!
//! Secrets (password, recovery phrase) are read from stdin, never from argv.

use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

/// SmartDrive - safety and recovery core of the encrypted drive appliance
#[derive(Parser, Debug)]
#[command(name = "smartdrive")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Application root (`.smartdrive` directory). Defaults to the one
    /// enclosing this executable.
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a one-time recovery kit for the payload volume.
    ///
    /// Reads the volume password from the first line of stdin.
    GenerateRecoveryKit {
        /// Payload volume; defaults to `volume_path` in config.json
        #[arg(long)]
        volume: Option<PathBuf>,

        /// Keyfile to escrow alongside the password
        #[arg(long)]
        keyfile: Option<PathBuf>,

        /// Volume header backup to store next to the container
        #[arg(long)]
        header_backup: Option<PathBuf>,

        /// Also write the paper chunks to this file (absolute path)
        #[arg(long)]
        chunks_out: Option<PathBuf>,

        /// Replace an existing kit
        #[arg(long)]
        force: bool,

        /// Volume encryption tool, for the environment snapshot
        #[arg(long, default_value = "veracrypt")]
        tool: String,
    },

    /// Unlock the payload volume with the recovery phrase.
    ///
    /// Reads the 24-word phrase from the first line of stdin. The kit is
    /// destroyed only after the volume mounts.
    Recover {
        /// Payload volume; defaults to `volume_path` in config.json
        #[arg(long)]
        volume: Option<PathBuf>,

        /// Mount point or drive letter; defaults to `mount_target` in config.json
        #[arg(long)]
        mount_target: Option<String>,

        /// Volume encryption tool
        #[arg(long, default_value = "veracrypt")]
        tool: String,
    },

    /// Rebuild the recovery container from paper chunks
    Reconstruct {
        /// File holding one chunk per line
        chunk_file: PathBuf,

        /// Output file; defaults to the container location under the root
        #[arg(long)]
        output: Option<PathBuf>,

        /// Overwrite an existing output file
        #[arg(long)]
        force: bool,
    },

    /// Check whether a disk may be partitioned
    ValidateTarget {
        /// Disk number as currently enumerated
        #[arg(long)]
        disk: u32,

        /// Location of the running setup script; defaults to this executable
        #[arg(long)]
        script: Option<PathBuf>,
    },

    /// Report duplicate layout resources and, with --disk, the partition roles
    #[command(group(ArgGroup::new("launcher").args(["launcher_mount", "launcher_letter"])))]
    CheckLayout {
        /// Disk whose launcher and payload partitions to resolve
        #[arg(long)]
        disk: Option<u32>,

        /// Mount point of the launcher partition
        #[arg(long, requires = "disk")]
        launcher_mount: Option<String>,

        /// Drive letter of the launcher partition
        #[arg(long, requires = "disk")]
        launcher_letter: Option<char>,
    },

    /// Show the recovery kit state of this drive
    Status,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
