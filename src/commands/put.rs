//! # Put Command
//!
//! Stages a service list, template, or node file under the user's own
//! namespace. Nothing is visible to other users until `commit`.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use log::info;

use conf_center::server::{PutTarget, Request};

use super::{read_file, Context};

#[derive(Args, Debug)]
pub struct PutArgs {
    /// User whose namespace receives the file
    pub user: String,

    /// Environment id (digits)
    #[arg(long)]
    pub env: String,

    /// Cluster name
    #[arg(long)]
    pub cluster: String,

    /// File to upload
    #[arg(long, value_name = "FILE")]
    pub file: PathBuf,

    #[command(subcommand)]
    pub kind: PutKind,
}

#[derive(Subcommand, Debug)]
pub enum PutKind {
    /// Stage the cluster's service list (JSON)
    ServiceList,

    /// Stage a template
    Template {
        /// Template name
        name: String,
    },

    /// Stage a file for one node
    NodeFile {
        /// Global node id (digits)
        global_id: String,
        /// Local node id (digits)
        local_id: String,
        /// File name
        name: String,
    },
}

/// Execute the put command
pub fn execute(args: PutArgs, ctx: &Context) -> Result<()> {
    let file = read_file(&args.file)?;
    info!("staging {} ({} bytes)", args.file.display(), file.len());

    let target = match args.kind {
        PutKind::ServiceList => PutTarget::ServiceList {
            env: args.env,
            cluster: args.cluster,
        },
        PutKind::Template { name } => PutTarget::Template {
            env: args.env,
            cluster: args.cluster,
            name,
        },
        PutKind::NodeFile {
            global_id,
            local_id,
            name,
        } => PutTarget::NodeFile {
            env: args.env,
            cluster: args.cluster,
            global_id,
            local_id,
            name,
        },
    };

    let response = ctx.server.handle(Request::Put {
        user: args.user,
        target,
        file: Some(file),
    });
    ctx.report(&response, None)
}
