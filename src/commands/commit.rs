//! # Commit Command
//!
//! Finalizes the user's staged batch as a new version, or replaces the
//! infrastructure document when `--infrastructure` is given.
//!
//! ```bash
//! conf-center commit alice                       # next patch version
//! conf-center commit alice --version 2.0.0       # explicit tag
//! conf-center commit admin --infrastructure --file infra.json
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use conf_center::server::{CommitRequest, Request};

use super::{read_file, Context};

#[derive(Args, Debug)]
pub struct CommitArgs {
    /// User whose staged batch is committed
    pub user: String,

    /// Tag for the new version (defaults to the next patch version)
    #[arg(long, conflicts_with = "infrastructure")]
    pub version: Option<String>,

    /// Replace the infrastructure document instead of committing staged data
    #[arg(long, requires = "file")]
    pub infrastructure: bool,

    /// Infrastructure document to upload
    #[arg(long, value_name = "FILE", requires = "infrastructure")]
    pub file: Option<PathBuf>,
}

/// Execute the commit command
pub fn execute(args: CommitArgs, ctx: &Context) -> Result<()> {
    let target = if args.infrastructure {
        let file = args.file.as_deref().map(read_file).transpose()?;
        CommitRequest::Infrastructure { file }
    } else {
        CommitRequest::Config {
            version: args.version,
        }
    };

    let response = ctx.server.handle(Request::Commit {
        user: args.user,
        target,
    });
    ctx.report(&response, None)
}
