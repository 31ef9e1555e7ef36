//! Roles command - Show the initiator election for a set of participants

use anyhow::{bail, Result};
use clap::Args;
use teleconsult_core::{initiator_of, resolve_role};
use teleconsult_signaling_core::{DeclaredRole, Participant};

#[derive(Args, Debug)]
pub struct RolesArgs {
    /// Local participant as `id:role`
    #[arg(long, value_parser = parse_participant)]
    pub local: Participant,

    /// Visible remote participant as `id:role` (repeatable)
    #[arg(long = "remote", value_parser = parse_participant)]
    pub remotes: Vec<Participant>,
}

fn parse_participant(raw: &str) -> Result<Participant, String> {
    let (id, role) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected id:role, got '{}'", raw))?;
    let id = id.trim();
    if id.is_empty() {
        return Err(format!("missing user id in '{}'", raw));
    }
    let role: DeclaredRole = role.trim().parse().unwrap_or(DeclaredRole::Unknown);
    Ok(Participant::new(id, role))
}

/// Execute roles command
pub fn execute(args: RolesArgs) -> Result<()> {
    if args.remotes.iter().any(|r| r.user_id == args.local.user_id) {
        bail!("{} is listed as both local and remote", args.local.user_id);
    }

    match resolve_role(&args.local, &args.remotes) {
        Some(role) => println!("🎭 {} is the {}", args.local, role),
        None => println!("⏳ {} has nobody to negotiate with yet", args.local),
    }

    let everyone: Vec<&Participant> = args.remotes.iter().chain(std::iter::once(&args.local)).collect();
    if everyone.len() > 1 {
        if let Some(initiator) = initiator_of(everyone) {
            println!("📤 Offer is sent by {}", initiator);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_id_and_role() {
        let p = parse_participant("doctor-1:Doctor").unwrap();
        assert_eq!(p.user_id.as_str(), "doctor-1");
        assert_eq!(p.role, DeclaredRole::Doctor);

        assert_eq!(parse_participant("x:nurse").unwrap().role, DeclaredRole::Unknown);
        assert!(parse_participant("no-role").is_err());
        assert!(parse_participant(":doctor").is_err());
    }

    #[test]
    fn rejects_local_listed_as_remote() {
        let args = RolesArgs {
            local: Participant::new("a", DeclaredRole::Patient),
            remotes: vec![Participant::new("a", DeclaredRole::Doctor)],
        };
        assert!(execute(args).is_err());
    }
}
