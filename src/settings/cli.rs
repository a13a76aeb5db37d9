use super::Parser;

#[derive(Parser, Debug)]
#[command(name = "niti-auth", about = "Token lifecycle service for the Telegram Mini App")]
pub struct Cli {
    /// Path to a TOML settings file; defaults to settings/dev.toml in debug builds.
    #[arg(long)]
    pub settings: Option<String>,
}
