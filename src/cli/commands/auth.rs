use clap::Subcommand;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{generate_jwt, Claims};
use crate::cli::utils::{connect_store, output_success};
use crate::cli::OutputFormat;
use crate::services::ProfileService;

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Mint a bearer token for an existing profile")]
    Token {
        #[arg(long, help = "Profile id")]
        user: Uuid,
    },
}

pub async fn handle(cmd: AuthCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        AuthCommands::Token { user } => {
            let profiles = ProfileService::new(connect_store().await?);
            let profile = profiles.get(user).await?;
            if !profile.is_active {
                anyhow::bail!("Profile {} is inactive", profile.id);
            }

            let token = generate_jwt(&Claims::new(profile.id, profile.role))?;
            output_success(
                &output_format,
                &format!("Token for {} ({})", profile.email, profile.role),
                Some(json!({ "token": token })),
            )
        }
    }
}
