/*!
    Helper functions for modifying a node's `config.toml` and `app.toml`.

    Since we do not need to understand the full structure of the
    Cosmos SDK config, we are updating the config as dynamic TOML
    values instead of serializing them into proper types.
*/

use core::time::Duration;
use eyre::eyre;
use std::fs;
use std::path::Path;
use toml::Value;
use tracing::debug;

use crate::error::Error;

/**
   Read the TOML file at `path`, apply `modify` and write it back.
*/
pub fn update_toml_file(
    path: &Path,
    modify: impl FnOnce(&mut Value) -> Result<(), Error>,
) -> Result<(), Error> {
    let content = fs::read_to_string(path)?;
    let mut config: Value = toml::from_str(&content)?;

    modify(&mut config)?;

    fs::write(path, toml::to_string_pretty(&config)?)?;

    debug!("updated node config {}", path.display());

    Ok(())
}

fn section<'a>(
    config: &'a mut Value,
    name: &str,
) -> Result<&'a mut toml::map::Map<String, Value>, Error> {
    let section = config
        .get_mut(name)
        .ok_or_else(|| eyre!("expect {} section", name))?
        .as_table_mut()
        .ok_or_else(|| eyre!("expect object"))?;

    Ok(section)
}

fn root(config: &mut Value) -> Result<&mut toml::map::Map<String, Value>, Error> {
    let root = config
        .as_table_mut()
        .ok_or_else(|| eyre!("expect object"))?;

    Ok(root)
}

/// Set the `rpc.laddr` field in the full node config.
pub fn set_rpc_laddr(config: &mut Value, port: u16) -> Result<(), Error> {
    section(config, "rpc")?.insert(
        "laddr".to_string(),
        format!("tcp://0.0.0.0:{port}").into(),
    );

    Ok(())
}

/// Set the `p2p.laddr` field in the full node config.
pub fn set_p2p_laddr(config: &mut Value, port: u16) -> Result<(), Error> {
    section(config, "p2p")?.insert(
        "laddr".to_string(),
        format!("tcp://0.0.0.0:{port}").into(),
    );

    Ok(())
}

/**
   All nodes of a chain share one Docker network, which Tendermint would
   otherwise reject as duplicate peers.
*/
pub fn set_allow_duplicate_ip(config: &mut Value) -> Result<(), Error> {
    section(config, "p2p")?.insert("allow_duplicate_ip".to_string(), true.into());

    Ok(())
}

/// Set the `p2p.persistent_peers` field, as comma separated `id@host:port`.
pub fn set_persistent_peers(config: &mut Value, peers: &[String]) -> Result<(), Error> {
    section(config, "p2p")?.insert("persistent_peers".to_string(), peers.join(",").into());

    Ok(())
}

/// Set the `consensus.timeout_commit` field in the full node config.
pub fn set_timeout_commit(config: &mut Value, duration: Duration) -> Result<(), Error> {
    section(config, "consensus")?.insert(
        "timeout_commit".to_string(),
        format!("{}ms", duration.as_millis()).into(),
    );

    Ok(())
}

/// Set the `consensus.timeout_propose` field in the full node config.
pub fn set_timeout_propose(config: &mut Value, duration: Duration) -> Result<(), Error> {
    section(config, "consensus")?.insert(
        "timeout_propose".to_string(),
        format!("{}ms", duration.as_millis()).into(),
    );

    Ok(())
}

/// Set the `log_level` field in the full node config.
pub fn set_log_level(config: &mut Value, log_level: &str) -> Result<(), Error> {
    root(config)?.insert("log_level".to_string(), log_level.into());

    Ok(())
}

/// Set the `minimum-gas-prices` field in `app.toml`.
pub fn set_minimum_gas_price(config: &mut Value, price: &str) -> Result<(), Error> {
    root(config)?.insert("minimum-gas-prices".to_string(), price.into());

    Ok(())
}

/// Set the `grpc.address` field in `app.toml`.
pub fn set_grpc_address(config: &mut Value, port: u16) -> Result<(), Error> {
    section(config, "grpc")?.insert("address".to_string(), format!("0.0.0.0:{port}").into());

    Ok(())
}

pub fn disable_api(config: &mut Value) -> Result<(), Error> {
    if let Some(field) = config.get_mut("api") {
        field
            .as_table_mut()
            .ok_or_else(|| eyre!("expect object"))?
            .insert("enable".to_string(), false.into());
    }

    Ok(())
}

/**
   Replace every string in the genesis that is exactly `from` with `to`.

   A freshly initialized genesis uses `stake` for the bond, mint, crisis
   and governance denominations; tests run chains on their own native
   denomination instead.
*/
pub fn replace_genesis_denom(genesis: &mut serde_json::Value, from: &str, to: &str) {
    match genesis {
        serde_json::Value::String(value) if value == from => {
            *value = to.to_string();
        }
        serde_json::Value::Array(values) => {
            for value in values {
                replace_genesis_denom(value, from, to);
            }
        }
        serde_json::Value::Object(fields) => {
            for (_, value) in fields.iter_mut() {
                replace_genesis_denom(value, from, to);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG_TOML: &str = r#"
log_level = "info"

[rpc]
laddr = "tcp://127.0.0.1:26657"

[p2p]
laddr = "tcp://0.0.0.0:26656"
persistent_peers = ""

[consensus]
timeout_commit = "5s"
"#;

    #[test]
    fn updates_node_config() {
        let mut config: Value = toml::from_str(CONFIG_TOML).unwrap();

        set_rpc_laddr(&mut config, 26657).unwrap();
        set_allow_duplicate_ip(&mut config).unwrap();
        set_persistent_peers(
            &mut config,
            &["a@val-0:26656".to_string(), "b@fn-0:26656".to_string()],
        )
        .unwrap();
        set_timeout_commit(&mut config, Duration::from_secs(1)).unwrap();
        set_log_level(&mut config, "debug").unwrap();

        assert_eq!(config["rpc"]["laddr"].as_str(), Some("tcp://0.0.0.0:26657"));
        assert_eq!(config["p2p"]["allow_duplicate_ip"].as_bool(), Some(true));
        assert_eq!(
            config["p2p"]["persistent_peers"].as_str(),
            Some("a@val-0:26656,b@fn-0:26656")
        );
        assert_eq!(config["consensus"]["timeout_commit"].as_str(), Some("1000ms"));
        assert_eq!(config["log_level"].as_str(), Some("debug"));
    }

    #[test]
    fn missing_section_is_an_error() {
        let mut config: Value = toml::from_str("log_level = \"info\"").unwrap();

        assert!(set_grpc_address(&mut config, 9090).is_err());
        // optional sections are left alone
        assert!(disable_api(&mut config).is_ok());
    }

    #[test]
    fn updates_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        fs::write(&path, "minimum-gas-prices = \"\"\n").unwrap();

        update_toml_file(&path, |config| set_minimum_gas_price(config, "0.01atoma")).unwrap();

        let config: Value = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config["minimum-gas-prices"].as_str(), Some("0.01atoma"));
    }

    #[test]
    fn replaces_genesis_denom() {
        let mut genesis = serde_json::json!({
            "app_state": {
                "staking": { "params": { "bond_denom": "stake" } },
                "gov": { "deposit_params": { "min_deposit": [{ "denom": "stake", "amount": "1" }] } },
                "bank": { "denom_metadata": [], "note": "stakeholder" }
            }
        });

        replace_genesis_denom(&mut genesis, "stake", "atoma");

        assert_eq!(
            genesis["app_state"]["staking"]["params"]["bond_denom"],
            "atoma"
        );
        assert_eq!(
            genesis["app_state"]["gov"]["deposit_params"]["min_deposit"][0]["denom"],
            "atoma"
        );
        assert_eq!(genesis["app_state"]["bank"]["note"], "stakeholder");
    }
}
