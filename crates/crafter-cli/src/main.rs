use std::env;

use contracts::{CrafterConfig, SkillType};
use crafter_core::{AuthorityState, CrafterWorld, MemoryHost, SqliteWorkStore};

fn print_usage() {
    println!("crafter-cli <command>");
    println!("commands:");
    println!("  skills");
    println!("    lists the hireable craft skills");
    println!("  quote <skill> <current_ql> <target_ql> [mail]");
    println!("    prints the price in irons for one improvement order");
    println!("  simulate [ticks] [sqlite_path]");
    println!("    runs the demo workshop to the target tick and persists to sqlite");
    println!("    default ticks: 30, default path: crafter_runs.sqlite");
    println!("  status [sqlite_path]");
    println!("    prints the persisted crafter rows and authority balances");
}

fn parse_skill(value: Option<&String>) -> Result<SkillType, String> {
    let raw = value.ok_or_else(|| "missing skill".to_string())?;
    SkillType::parse(raw).ok_or_else(|| format!("unknown skill: {raw}"))
}

fn parse_quality(value: Option<&String>, label: &str) -> Result<f32, String> {
    let raw = value.ok_or_else(|| format!("missing {label}"))?;
    let quality = raw
        .parse::<f32>()
        .map_err(|_| format!("invalid {label}: {raw}"))?;
    if !quality.is_finite() || !(0.0..=100.0).contains(&quality) {
        return Err(format!("{label} must be in [0, 100], got {raw}"));
    }
    Ok(quality)
}

fn parse_sqlite_path(value: Option<&String>) -> String {
    value
        .map(String::to_string)
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(|| "crafter_runs.sqlite".to_string())
}

fn run_quote(args: &[String]) -> Result<(), String> {
    let skill = parse_skill(args.get(2))?;
    let current_ql = parse_quality(args.get(3), "current_ql")?;
    let target_ql = parse_quality(args.get(4), "target_ql")?;
    if target_ql < current_ql {
        return Err(format!(
            "target_ql {target_ql} is below current_ql {current_ql}"
        ));
    }
    let mailed = args.get(5).map(String::as_str) == Some("mail");

    let config = CrafterConfig::default();
    let price = crafter_core::pricing::quote(skill, current_ql, target_ql, mailed, &config);
    println!(
        "quote skill={skill} current={current_ql} target={target_ql} mailed={mailed} price={price} irons"
    );
    Ok(())
}

/// Demo workshop: one smith, one forge, two priced orders and a donation.
/// The first order is collected and settled once finished.
fn run_simulation(args: &[String]) -> Result<(), String> {
    let ticks = args
        .get(2)
        .map(|value| {
            value
                .parse::<u64>()
                .map_err(|_| format!("invalid ticks: {value}"))
        })
        .transpose()?
        .unwrap_or(30);
    let sqlite_path = parse_sqlite_path(args.get(3));

    let smith = 100;
    let owner = 500;
    let customer = 200;
    let forge = 77;

    let mut world = CrafterWorld::new(CrafterConfig::default());
    world.add_crafter(smith, "Alvar", SkillType::Blacksmithing, owner);
    world
        .bind_forge(smith, Some(forge))
        .map_err(|err| err.to_string())?;

    let mut host = MemoryHost::new();
    host.add_forge(forge);
    host.add_item(1, 20.0);
    host.add_item(2, 35.0);
    host.add_item(3, 10.0);

    world
        .submit_order(smith, 1, customer, 60.0, false, &host)
        .map_err(|err| err.to_string())?;
    world
        .submit_order(smith, 2, customer, 80.0, true, &host)
        .map_err(|err| err.to_string())?;
    world
        .submit_donation(smith, 3)
        .map_err(|err| err.to_string())?;

    world.tick_n(&mut host, ticks);

    if let Ok(ask) = world.begin_collection(smith, customer, &mut host) {
        world
            .offer_payment(smith, customer, ask, &mut host)
            .map_err(|err| err.to_string())?;
    }

    let authority = AuthorityState {
        tax_balance: world.tax_balance(),
        upkeep_consumed: world.upkeep_consumed(),
        current_tick: world.current_tick(),
    };
    let config = world.config().clone();
    let snapshots = world.snapshots();
    let events = world.drain_events();

    let mut store =
        SqliteWorkStore::open(&sqlite_path).map_err(|err| format!("failed to open store: {err}"))?;
    store
        .persist_state(&config, authority, &snapshots, &events)
        .map_err(|err| format!("failed to persist state: {err}"))?;

    println!(
        "simulated ticks={} crafters={} events={} owner_balance={} sqlite={}",
        authority.current_tick,
        snapshots.len(),
        events.len(),
        world.shop_balance(smith).unwrap_or(0),
        sqlite_path
    );
    Ok(())
}

fn run_status(args: &[String]) -> Result<(), String> {
    let sqlite_path = parse_sqlite_path(args.get(2));
    let store =
        SqliteWorkStore::open(&sqlite_path).map_err(|err| format!("failed to open store: {err}"))?;

    let snapshots = store
        .load_snapshots()
        .map_err(|err| format!("failed to load crafters: {err}"))?;
    if snapshots.is_empty() {
        println!("no persisted crafters in {sqlite_path}");
        return Ok(());
    }
    for snapshot in &snapshots {
        let jobs = snapshot.workbook_text.lines().count();
        println!(
            "crafter id={} name={} skill={} level={:.1} owner={} balance={} forge={:?} jobs={}",
            snapshot.id,
            snapshot.name,
            snapshot.skill,
            snapshot.skill_level,
            snapshot.owner,
            snapshot.balance,
            snapshot.forge,
            jobs
        );
    }
    if let Some(authority) = store
        .load_authority()
        .map_err(|err| format!("failed to load authority: {err}"))?
    {
        println!(
            "authority tick={} tax_balance={} upkeep_consumed={}",
            authority.current_tick, authority.tax_balance, authority.upkeep_consumed
        );
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    let result = match command {
        Some("skills") => {
            for skill in SkillType::ALL {
                println!("{skill}");
            }
            Ok(())
        }
        Some("quote") => run_quote(&args),
        Some("simulate") => run_simulation(&args),
        Some("status") => run_status(&args),
        _ => {
            print_usage();
            std::process::exit(2);
        }
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        print_usage();
        std::process::exit(2);
    }
}
