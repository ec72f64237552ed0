//! # Delete Command
//!
//! Discards every document the user has staged.

use anyhow::Result;
use clap::Args;

use conf_center::server::Request;

use super::Context;

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// User whose staged documents are discarded
    pub user: String,
}

/// Execute the delete command
pub fn execute(args: DeleteArgs, ctx: &Context) -> Result<()> {
    let response = ctx.server.handle(Request::Delete { user: args.user });
    ctx.report(&response, None)
}
