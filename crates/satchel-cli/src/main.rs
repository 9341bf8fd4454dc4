use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use satchel_core::paths::data_dir;
use satchel_core::{
    decode, encode, fingerprint, CodecError, MeetingRecord, Passphrase, ProfileStore, UserProfile,
    ARTIFACT_EXTENSION,
};
use std::fs;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::warn;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "satchel")]
#[command(about = "Encrypted profile vault for meeting data", long_about = None)]
struct Cli {
    /// Override the profile data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new profile
    Create {
        /// Display name for the profile
        username: String,
    },

    /// List stored profiles
    List,

    /// Show a stored profile as JSON
    Show { profile_id: Uuid },

    /// Export a profile as an encrypted artifact file
    Export {
        profile_id: Uuid,

        /// Output file (defaults to <username>.satchel)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Import a profile from an encrypted artifact file
    Import {
        file: PathBuf,

        /// Keep the profile id embedded in the artifact instead of assigning
        /// a fresh one
        #[arg(long)]
        keep_id: bool,
    },

    /// Delete a stored profile and all of its meeting data
    Delete {
        profile_id: Uuid,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Manage meetings on a profile
    Meeting {
        #[command(subcommand)]
        command: MeetingCommands,
    },
}

#[derive(Subcommand)]
enum MeetingCommands {
    /// Add a meeting record to a profile
    Add {
        profile_id: Uuid,

        #[arg(long)]
        title: String,

        /// Start time, RFC 3339 (e.g. 2026-03-04T09:30:00Z)
        #[arg(long, value_name = "RFC3339")]
        starts_at: DateTime<Utc>,

        /// Duration in minutes
        #[arg(long, default_value_t = 30)]
        duration: u32,

        #[arg(long = "participant")]
        participants: Vec<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// List the meetings on a profile
    List { profile_id: Uuid },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let data = match cli.data_dir {
        Some(dir) => dir,
        None => data_dir()?,
    };
    let store = ProfileStore::open(&data)?;

    match cli.command {
        Commands::Create { username } => {
            let profile = UserProfile::new(username);
            store.save(&profile)?;
            println!("Created profile {} ({})", profile.username, profile.profile_id);
        }

        Commands::List => {
            let profiles = store.list()?;
            if profiles.is_empty() {
                println!("No profiles stored in {}", store.root().display());
            }
            for profile in profiles {
                println!(
                    "{}  {}  ({} meetings)",
                    profile.profile_id,
                    profile.username,
                    profile.meetings.len()
                );
            }
        }

        Commands::Show { profile_id } => {
            let profile = store.load(&profile_id)?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }

        Commands::Export { profile_id, out } => {
            let profile = store.load(&profile_id)?;
            let phrase = prompt_phrase_twice("Export passphrase")?;
            if phrase.len() < 8 {
                warn!("short passphrase; anyone who can guess it can open the export");
            }
            let artifact = encode(&profile, &phrase)?;
            let out = out.unwrap_or_else(|| {
                PathBuf::from(format!("{}.{}", profile.username, ARTIFACT_EXTENSION))
            });
            fs::write(&out, &artifact).with_context(|| format!("write {}", out.display()))?;
            println!(
                "Exported {} ({} bytes, fingerprint {})",
                out.display(),
                artifact.len(),
                fingerprint(&artifact)
            );
        }

        Commands::Import { file, keep_id } => {
            let bytes = fs::read(&file).with_context(|| format!("read {}", file.display()))?;
            let phrase = prompt_phrase_once("Artifact passphrase")?;
            let mut profile = match decode(&bytes, &phrase) {
                Ok(profile) => profile,
                Err(CodecError::InvalidInput(reason)) => bail!("{reason}"),
                // Deliberately one message for malformed, wrong-phrase and
                // corrupted artifacts.
                Err(_) => bail!("invalid artifact or incorrect passphrase"),
            };
            if !keep_id {
                profile.profile_id = Uuid::new_v4();
            }
            store.save(&profile)?;
            println!(
                "Imported profile {} ({}, {} meetings)",
                profile.username,
                profile.profile_id,
                profile.meetings.len()
            );
        }

        Commands::Delete { profile_id, yes } => {
            if !yes && !confirm(&format!("Delete profile {profile_id} and all meeting data?"))? {
                println!("Aborted");
                return Ok(());
            }
            if store.delete(&profile_id)? {
                println!("Profile {profile_id} deleted");
            } else {
                println!("Profile {profile_id} was not present");
            }
        }

        Commands::Meeting { command } => match command {
            MeetingCommands::Add {
                profile_id,
                title,
                starts_at,
                duration,
                participants,
                notes,
            } => {
                let mut profile = store.load(&profile_id)?;
                let mut meeting = MeetingRecord::new(title, starts_at, duration);
                meeting.participants = participants;
                meeting.notes = notes;
                let meeting_id = meeting.meeting_id;
                profile.add_meeting(meeting);
                store.save(&profile)?;
                println!("Added meeting {meeting_id} to {}", profile.username);
            }

            MeetingCommands::List { profile_id } => {
                let profile = store.load(&profile_id)?;
                for meeting in &profile.meetings {
                    println!(
                        "{}  {}  {} ({} min)",
                        meeting.meeting_id, meeting.starts_at, meeting.title, meeting.duration_minutes
                    );
                }
            }
        },
    }

    Ok(())
}

fn prompt_phrase_once(prompt: &str) -> Result<Passphrase> {
    if let Ok(phrase) = std::env::var("SATCHEL_PASSPHRASE") {
        if !phrase.is_empty() {
            return Ok(Passphrase::new(phrase)?);
        }
    }
    let phrase = rpassword::prompt_password(format!("{prompt}: "))
        .map_err(|e| anyhow!("passphrase prompt: {e}"))?;
    Ok(Passphrase::new(phrase)?)
}

fn prompt_phrase_twice(prompt: &str) -> Result<Passphrase> {
    if let Ok(phrase) = std::env::var("SATCHEL_PASSPHRASE") {
        if !phrase.is_empty() {
            return Ok(Passphrase::new(phrase)?);
        }
    }
    let first = rpassword::prompt_password(format!("{prompt}: "))
        .map_err(|e| anyhow!("passphrase prompt: {e}"))?;
    let second = rpassword::prompt_password("Confirm passphrase: ")
        .map_err(|e| anyhow!("passphrase prompt: {e}"))?;
    if first != second {
        return Err(anyhow!("passphrases do not match"));
    }
    Ok(Passphrase::new(first)?)
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
