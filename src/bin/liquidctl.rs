//! liquidctl: prints every object liquidd exports, sorted by path.

use std::{collections::BTreeMap, fmt::Write as _};

use anyhow::{Context, Result};
use clap::Parser;
use zbus::{
    Connection,
    fdo::{ManagedObjects, ObjectManagerProxy},
};
use zvariant::Value;

/// liquidctl: show fan telemetry published by liquidd
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Connect to the system bus instead of the session bus
    #[arg(long)]
    system: bool,

    /// Bus name liquidd owns
    #[arg(long, default_value = "org.liquidctl.LiquidD")]
    name: String,

    /// Object path of liquidd's object manager
    #[arg(long, default_value = "/org/liquidctl/LiquidD")]
    path: String,
}

/// One block per object, one indented block per interface that has
/// properties, one line per property.
fn render(objects: &ManagedObjects) -> Result<String> {
    let sorted: BTreeMap<_, _> = objects
        .iter()
        .map(|(path, interfaces)| (path.as_str(), interfaces))
        .collect();

    let mut out = String::new();
    for (path, interfaces) in sorted {
        writeln!(out, "{path}:")?;

        let interfaces: BTreeMap<_, _> = interfaces
            .iter()
            .filter(|(_, properties)| !properties.is_empty())
            .map(|(name, properties)| (name.as_str(), properties))
            .collect();

        for (interface, properties) in interfaces {
            writeln!(out, "\t{interface}:")?;
            let properties: BTreeMap<_, _> = properties.iter().collect();
            for (property, value) in properties {
                let value: &Value<'_> = value;
                writeln!(out, "\t\t{property}: {value}")?;
            }
        }
    }
    Ok(out)
}

async fn run(cli: Cli) -> Result<()> {
    let connection = if cli.system {
        Connection::system().await
    } else {
        Connection::session().await
    }
    .context("Can't connect to D-Bus")?;

    let manager = ObjectManagerProxy::builder(&connection)
        .destination(cli.name.as_str())?
        .path(cli.path.as_str())?
        .build()
        .await?;

    let objects = manager
        .get_managed_objects()
        .await
        .with_context(|| format!("Can't connect to {}", cli.name))?;

    print!("{}", render(&objects)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("tokio runtime")?
        .block_on(run(cli))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use zbus::names::OwnedInterfaceName;
    use zvariant::{OwnedObjectPath, OwnedValue};

    type Properties = HashMap<String, OwnedValue>;

    fn iface(name: &str, properties: &[(&str, Value<'_>)]) -> (OwnedInterfaceName, Properties) {
        (
            OwnedInterfaceName::try_from(name).unwrap(),
            properties
                .iter()
                .map(|(k, v)| (k.to_string(), v.try_to_owned().unwrap()))
                .collect(),
        )
    }

    fn path(p: &str) -> OwnedObjectPath {
        OwnedObjectPath::try_from(p).unwrap()
    }

    #[test]
    fn objects_are_printed_in_path_order() {
        let objects: ManagedObjects = HashMap::from([
            (
                path("/org/liquidctl/LiquidD/NzxtSmart2/fan2"),
                HashMap::from([iface(
                    "org.liquidctl.LiquidD.Fan",
                    &[("Rpm", Value::from(1300u16))],
                )]),
            ),
            (
                path("/org/liquidctl/LiquidD/NzxtSmart2"),
                HashMap::from([
                    iface(
                        "org.liquidctl.LiquidD.HidDevice",
                        &[("VendorId", Value::from(0x1e71u16))],
                    ),
                    iface("org.freedesktop.DBus.Introspectable", &[]),
                ]),
            ),
            (
                path("/org/liquidctl/LiquidD/NzxtSmart2/fan1"),
                HashMap::from([iface(
                    "org.liquidctl.LiquidD.Fan",
                    &[("Rpm", Value::from(1200u16)), ("DutyPercent", Value::from(50u8))],
                )]),
            ),
        ]);

        let out = render(&objects).unwrap();
        let headers: Vec<&str> = out.lines().filter(|l| !l.starts_with('\t')).collect();
        assert_eq!(
            headers,
            vec![
                "/org/liquidctl/LiquidD/NzxtSmart2:",
                "/org/liquidctl/LiquidD/NzxtSmart2/fan1:",
                "/org/liquidctl/LiquidD/NzxtSmart2/fan2:",
            ]
        );

        // Interfaces without properties are omitted.
        assert!(!out.contains("Introspectable"));

        let fan1: Vec<&str> = out
            .lines()
            .skip_while(|l| *l != "/org/liquidctl/LiquidD/NzxtSmart2/fan1:")
            .skip(1)
            .take(3)
            .collect();
        assert_eq!(fan1[0], "\torg.liquidctl.LiquidD.Fan:");
        assert!(fan1[1].starts_with("\t\tDutyPercent: ") && fan1[1].contains("50"));
        assert!(fan1[2].starts_with("\t\tRpm: ") && fan1[2].contains("1200"));
    }

    #[test]
    fn empty_tree_prints_nothing() {
        assert_eq!(render(&ManagedObjects::new()).unwrap(), "");
    }

    #[test]
    fn defaults_match_the_daemon() {
        let cli = Cli::parse_from(["liquidctl"]);
        assert!(!cli.system);
        assert_eq!(cli.name, "org.liquidctl.LiquidD");
        assert_eq!(cli.path, "/org/liquidctl/LiquidD");
    }
}
