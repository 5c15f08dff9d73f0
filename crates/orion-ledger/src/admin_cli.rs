//! orion-admin CLI tool
//!
//! Operator commands against a local ledger.
//!
//! Usage:
//!   orion-admin init
//!   orion-admin enroll <sponsor> [upline]
//!   orion-admin activate <member> [upline]
//!   orion-admin approve <beneficiary> <originator> <level> [approver]
//!   orion-admin reject <beneficiary> <originator> <level> [approver]
//!   orion-admin balance <member>
//!   orion-admin tree <member>
//!   orion-admin settings
//!   orion-admin set <key> <value>

use orion_ledger::{
    ActivationRequest, CommissionKey, LedgerConfig, MatrixView, Member, MemberId, Storage,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn print_usage() {
    eprintln!("orion-admin - Operate the Bright Orion matrix ledger");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  orion-admin init                              Create root admin and default settings");
    eprintln!("  orion-admin enroll <sponsor> [upline]         Enroll a pending member");
    eprintln!("  orion-admin activate <member> [upline]        Place member and post commissions");
    eprintln!("  orion-admin approve <ben> <orig> <level> [by] Approve a pending commission");
    eprintln!("  orion-admin reject <ben> <orig> <level> [by]  Reject a pending commission");
    eprintln!("  orion-admin balance <member>                  Show commission balance");
    eprintln!("  orion-admin tree <member>                     Print matrix and open slots");
    eprintln!("  orion-admin settings                          List settings");
    eprintln!("  orion-admin set <key> <value>                 Update a setting");
    eprintln!();
    eprintln!("Members are given by code (BO000002) or numeric id.");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  ORION_DATA_DIR                Ledger directory (default: ./orion-data)");
    eprintln!("  ORION_MAX_PLACEMENT_ATTEMPTS  Commit attempts on conflict (default: 5)");
    eprintln!("  ORION_ADMIN                   Approver member (default: BO000001)");
}

fn require<'a>(args: &'a [String], count: usize, usage: &str) -> Result<&'a [String], String> {
    if args.len() < count {
        return Err(format!("usage: orion-admin {}", usage));
    }
    Ok(&args[..count])
}

fn describe(member: &Member) -> String {
    format!(
        "{} (id {}, {:?}, sponsor {}, upline {})",
        member.code,
        member.id,
        member.status,
        member
            .sponsor_id
            .map_or_else(|| "-".to_string(), |id| id.to_string()),
        member
            .upline_id
            .map_or_else(|| "-".to_string(), |id| id.to_string()),
    )
}

fn commission_key(storage: &Storage, args: &[String]) -> Result<CommissionKey, String> {
    let beneficiary = storage.resolve_member(&args[0]).map_err(|e| e.to_string())?;
    let originator = storage.resolve_member(&args[1]).map_err(|e| e.to_string())?;
    let level = args[2]
        .parse()
        .map_err(|_| format!("level must be a number: {:?}", args[2]))?;
    Ok(CommissionKey {
        beneficiary_id: beneficiary.id,
        originator_id: originator.id,
        level,
    })
}

fn approver(
    storage: &Storage,
    config: &LedgerConfig,
    explicit: Option<&String>,
) -> Result<MemberId, String> {
    let raw = explicit
        .or(config.admin.as_ref())
        .cloned()
        .unwrap_or_else(|| MemberId::ROOT.to_string());
    storage
        .resolve_member(&raw)
        .map(|m| m.id)
        .map_err(|e| e.to_string())
}

fn print_tree(storage: &Storage, parent: MemberId, depth: usize) -> Result<(), String> {
    for child in storage.children(parent).map_err(|e| e.to_string())? {
        let code = storage
            .member(child.member_id)
            .map_err(|e| e.to_string())?
            .map(|m| m.code.to_string())
            .unwrap_or_else(|| child.member_id.to_string());
        println!("{}{}. {}", "  ".repeat(depth + 1), child.position, code);
        print_tree(storage, child.member_id, depth + 1)?;
    }
    Ok(())
}

fn run(args: &[String]) -> Result<(), String> {
    let config = LedgerConfig::from_env().map_err(|e| e.to_string())?;
    let storage = Storage::from_config(&config).map_err(|e| {
        format!(
            "Failed to open ledger at {:?}: {}",
            config.data_dir, e
        )
    })?;
    let rest = &args[2..];

    match args[1].as_str() {
        "init" => {
            let root = storage.bootstrap_root().map_err(|e| e.to_string())?;
            println!("{}", describe(&root));
        }
        "enroll" => {
            let rest = require(rest, 1, "enroll <sponsor> [upline]")?;
            let sponsor = storage.resolve_member(&rest[0]).map_err(|e| e.to_string())?;
            let upline = match args.get(3) {
                Some(raw) => Some(storage.resolve_member(raw).map_err(|e| e.to_string())?.id),
                None => None,
            };
            let member = storage
                .enroll_member(sponsor.id, upline)
                .map_err(|e| e.to_string())?;
            println!("{}", describe(&member));
        }
        "activate" => {
            let rest = require(rest, 1, "activate <member> [upline]")?;
            let member = storage.resolve_member(&rest[0]).map_err(|e| e.to_string())?;
            let mut request =
                ActivationRequest::for_member(&member).map_err(|e| e.to_string())?;
            if let Some(raw) = args.get(3) {
                request.upline = Some(storage.resolve_member(raw).map_err(|e| e.to_string())?.id);
            }
            let outcome = storage.activate(request).map_err(|e| e.to_string())?;
            println!(
                "{} placed under {} at position {} (spillover depth {})",
                member.code,
                outcome.position.parent_id,
                outcome.position.position,
                outcome.position.spillover_depth
            );
            for entry in outcome.posted {
                println!("  {} +{}", entry.key(), entry.amount);
            }
        }
        "approve" | "reject" => {
            let by = approver(&storage, &config, rest.get(3))?;
            let rest = require(rest, 3, "approve|reject <beneficiary> <originator> <level> [approver]")?;
            let key = commission_key(&storage, rest)?;
            let entry = if args[1] == "approve" {
                storage.approve_commission(&key, by)
            } else {
                storage.reject_commission(&key, by)
            }
            .map_err(|e| e.to_string())?;
            println!("{}: {} ({})", entry.key(), entry.status, entry.amount);
        }
        "balance" => {
            let rest = require(rest, 1, "balance <member>")?;
            let member = storage.resolve_member(&rest[0]).map_err(|e| e.to_string())?;
            let balance = storage.balance(member.id).map_err(|e| e.to_string())?;
            let json = serde_json::to_string_pretty(&balance).map_err(|e| e.to_string())?;
            println!("{}", json);
        }
        "tree" => {
            let rest = require(rest, 1, "tree <member>")?;
            let member = storage.resolve_member(&rest[0]).map_err(|e| e.to_string())?;
            let open = storage.open_slots(member.id).map_err(|e| e.to_string())?;
            println!("{} ({} open slots)", member.code, open);
            print_tree(&storage, member.id, 0)?;
        }
        "settings" => {
            let pairs = storage.settings_pairs().map_err(|e| e.to_string())?;
            if pairs.is_empty() {
                println!("(none, run `orion-admin init`)");
            }
            for (key, value) in pairs {
                println!("{} = {}", key, value);
            }
        }
        "set" => {
            let rest = require(rest, 2, "set <key> <value>")?;
            storage
                .set_setting(&rest[0], &rest[1])
                .map_err(|e| e.to_string())?;
            println!("{} = {}", rest[0], rest[1]);
        }
        other => return Err(format!("Unknown command: {}", other)),
    }

    Ok(())
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orion_ledger=info,orion_matrix=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    if matches!(args[1].as_str(), "-h" | "--help" | "help") {
        print_usage();
        std::process::exit(0);
    }

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
