use clap::Subcommand;
use serde_json::json;

use crate::auth::{generate_jwt, Claims};
use crate::cli::utils::{connect_store, output_success};
use crate::cli::OutputFormat;
use crate::services::profile_service::NewProfile;
use crate::services::ProfileService;

#[derive(Subcommand)]
pub enum UserCommands {
    #[command(about = "Create an admin profile and print a bearer token for it")]
    CreateAdmin {
        #[arg(long, help = "Display name")]
        name: String,
        #[arg(long, help = "Email (unique)")]
        email: String,
        #[arg(long, help = "Phone number")]
        phone: Option<String>,
    },
}

pub async fn handle(cmd: UserCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        UserCommands::CreateAdmin { name, email, phone } => {
            let profiles = ProfileService::new(connect_store().await?);
            let profile = profiles
                .create(NewProfile {
                    name: Some(name),
                    email: Some(email),
                    phone,
                    role: Some("admin".to_string()),
                })
                .await?;

            let token = generate_jwt(&Claims::new(profile.id, profile.role))?;
            output_success(
                &output_format,
                &format!("Created admin profile '{}'", profile.email),
                Some(json!({ "id": profile.id, "token": token })),
            )
        }
    }
}
