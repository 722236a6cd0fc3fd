use clap::{Args, Subcommand};

pub mod add;
pub mod export;
pub mod list;
pub mod remove;
pub mod rename;

use crate::cli::op::Op;

crate::command_enum! {
    (List, list::List),
    (Add, add::Add),
    (Remove, remove::Remove),
    (Rename, rename::Rename),
    (Export, export::Export),
}

// Generated Command, named for use outside this module
pub type KeysCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Keys {
    #[command(subcommand)]
    pub command: KeysCommand,
}

#[async_trait::async_trait]
impl Op for Keys {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
