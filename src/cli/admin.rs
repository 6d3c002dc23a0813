//! Operator commands over the admin service
//!
//! Each handler parses its arguments, calls into `AdminService` and renders
//! the result. Rejections come back as errors and change nothing.

use super::context::Context;
use originbind::admin::format_info;
use originbind::gatekeeper::access_history::format_history;
use originbind::gatekeeper::audit_trail::format_denials;
use originbind::identity::{Identity, Origin};

type CommandResult = Result<String, Box<dyn std::error::Error>>;

/// Approve an additional IP for a player
pub fn add(ctx: &Context, identity: &str, ip: &str) -> CommandResult {
    let identity = Identity::parse(identity)?;
    let origin = Origin::parse(ip)?;
    let admin = ctx.admin();

    let count = admin.add_origin(&identity, origin.clone())?;
    Ok(format!(
        "Added IP {} for {} ({}/{})",
        origin,
        identity,
        count,
        admin.max_origins()
    ))
}

/// Revoke one IP of a player
pub fn remove(ctx: &Context, identity: &str, ip: &str) -> CommandResult {
    let identity = Identity::parse(identity)?;
    let origin = Origin::parse(ip)?;
    let admin = ctx.admin();

    let remaining = admin.remove_origin(&identity, &origin)?;
    Ok(format!(
        "Removed IP {} from {} ({}/{})",
        origin,
        identity,
        remaining,
        admin.max_origins()
    ))
}

/// Remove every IP of a player
pub fn reset(ctx: &Context, identity: &str) -> CommandResult {
    let identity = Identity::parse(identity)?;
    let removed = ctx.admin().reset_all(&identity)?;

    let ips: Vec<&str> = removed.iter().map(Origin::as_str).collect();
    Ok(format!(
        "Reset {}: removed {}\nThe next login will register a new primary IP.",
        identity,
        ips.join(", ")
    ))
}

pub fn info(ctx: &Context, identity: &str) -> CommandResult {
    let identity = Identity::parse(identity)?;
    let info = ctx.admin().info(&identity)?;
    Ok(format_info(&info))
}

pub fn list(ctx: &Context) -> String {
    let admin = ctx.admin();
    let identities = admin.list_identities();
    if identities.is_empty() {
        return "No players registered.".to_string();
    }

    let mut output = format!("Registered players: {}\n", identities.len());
    for identity in identities {
        let ips: Vec<String> = admin
            .origins_for(&identity)
            .iter()
            .map(ToString::to_string)
            .collect();
        output.push_str(&format!("\n{} -> {}", identity, ips.join(", ")));
    }
    output
}

/// Show recent denials, optionally for a single player
pub fn failed(ctx: &Context, identity: Option<&str>, limit: usize) -> CommandResult {
    let admin = ctx.admin();
    let records = match identity {
        Some(identity) => admin.recent_denials_for(&Identity::parse(identity)?, limit),
        None => admin.recent_denials(limit),
    };
    Ok(format_denials(&records))
}

/// Show or clear a player's access history
pub fn history(ctx: &Context, identity: &str, clear: bool) -> CommandResult {
    let identity = Identity::parse(identity)?;
    let admin = ctx.admin();

    if clear {
        return Ok(if admin.clear_access_history(&identity)? {
            format!("Cleared access history for {}", identity)
        } else {
            format!("No access history for {}.", identity)
        });
    }

    let entries = admin.access_history(&identity)?;
    Ok(format_history(&identity, &entries))
}
