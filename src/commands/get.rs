//! # Get Command
//!
//! Reads the committed version list, the infrastructure document, a stored
//! document, or a configuration rendered for one node.
//!
//! `VERSION` is either a committed tag (`1.4.0`) or the requesting user's own
//! name, which reads that user's staged documents instead.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use conf_center::server::{GetTarget, Request};

use super::Context;

#[derive(Args, Debug)]
pub struct GetArgs {
    /// User issuing the request
    pub user: String,

    /// Write the returned file here instead of stdout
    #[arg(short, long, global = true, value_name = "FILE")]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub target: GetCommand,
}

/// Location shared by every per-cluster read.
#[derive(Args, Debug, Clone)]
pub struct Location {
    /// Committed tag, or your own username for staged data
    #[arg(long)]
    pub version: String,

    /// Environment id (digits)
    #[arg(long)]
    pub env: String,

    /// Cluster name
    #[arg(long)]
    pub cluster: String,
}

#[derive(Subcommand, Debug)]
pub enum GetCommand {
    /// List committed versions, oldest first
    Versions,

    /// Print the infrastructure document
    Infrastructure,

    /// Print a cluster's service list
    ServiceList {
        #[command(flatten)]
        at: Location,
    },

    /// Print a raw template
    Template {
        #[command(flatten)]
        at: Location,
        /// Template name
        name: String,
    },

    /// Print the merged deployment info of a cluster
    DeploymentInfo {
        #[command(flatten)]
        at: Location,
    },

    /// Render a template for one node
    Config {
        #[command(flatten)]
        at: Location,
        /// Template name
        name: String,
        /// Global node id (digits)
        #[arg(long)]
        global_id: String,
        /// Local node id (digits)
        #[arg(long)]
        local_id: String,
    },

    /// Print a file stored for one node
    NodeFile {
        #[command(flatten)]
        at: Location,
        /// Global node id (digits)
        global_id: String,
        /// Local node id (digits)
        local_id: String,
        /// File name
        name: String,
    },
}

impl From<GetCommand> for GetTarget {
    fn from(command: GetCommand) -> Self {
        match command {
            GetCommand::Versions => GetTarget::Versions,
            GetCommand::Infrastructure => GetTarget::Infrastructure,
            GetCommand::ServiceList { at } => GetTarget::ServiceList {
                version: at.version,
                env: at.env,
                cluster: at.cluster,
            },
            GetCommand::Template { at, name } => GetTarget::Template {
                version: at.version,
                env: at.env,
                cluster: at.cluster,
                name,
            },
            GetCommand::DeploymentInfo { at } => GetTarget::DeploymentInfo {
                version: at.version,
                env: at.env,
                cluster: at.cluster,
            },
            GetCommand::Config {
                at,
                name,
                global_id,
                local_id,
            } => GetTarget::Config {
                version: at.version,
                env: at.env,
                cluster: at.cluster,
                name,
                global_id,
                local_id,
            },
            GetCommand::NodeFile {
                at,
                global_id,
                local_id,
                name,
            } => GetTarget::NodeFile {
                version: at.version,
                env: at.env,
                cluster: at.cluster,
                global_id,
                local_id,
                name,
            },
        }
    }
}

/// Execute the get command
pub fn execute(args: GetArgs, ctx: &Context) -> Result<()> {
    let response = ctx.server.handle(Request::Get {
        user: args.user,
        target: args.target.into(),
    });
    ctx.report(&response, args.output.as_deref())
}
