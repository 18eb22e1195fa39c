/*!
   A Cosmos SDK chain whose nodes run as Docker containers.
*/

use core::cell::RefCell;
use core::time::Duration;
use eyre::eyre;
use serde_json::Value as JsonValue;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info, warn};

use crate::chain::config::ChainConfig;
use crate::chain::handle::{ChainHandle, ChainInitOptions, GenesisWallet};
use crate::chain::node_config;
use crate::docker::{
    sanitize_name, Bind, ContainerSpec, DockerClient, ExecOutput, NetworkId, TEST_NAME_LABEL,
};
use crate::error::Error;
use crate::util::random::random_u32;
use crate::util::retry::assert_eventually_succeed;

pub const RPC_PORT: u16 = 26657;

pub const GRPC_PORT: u16 = 9090;

pub const P2P_PORT: u16 = 26656;

/// Amount each validator account is funded with in the genesis.
pub const VALIDATOR_GENESIS_AMOUNT: u128 = 10_000_000_000_000;

/// Amount each validator self-delegates in its gentx.
pub const VALIDATOR_STAKE_AMOUNT: u128 = 5_000_000_000_000;

const VALIDATOR_KEY: &str = "validator";

/**
   Number of seconds to wait for a freshly started chain to reach
   [`MIN_START_HEIGHT`].
*/
const WAIT_FOR_BLOCKS_ATTEMPTS: u16 = 90;

const MIN_START_HEIGHT: u64 = 2;

/**
   A single validator or full node of a [`CosmosChain`].
*/
#[derive(Debug, Clone)]
pub struct ChainNode {
    /// Container name, which is also the node's hostname in the network.
    pub name: String,

    pub validator: bool,

    /// The node's home directory on the host, mounted into the container.
    pub host_home: PathBuf,

    pub container_id: Option<String>,
}

impl ChainNode {
    fn config_dir(&self) -> PathBuf {
        self.host_home.join("config")
    }

    fn genesis_path(&self) -> PathBuf {
        self.config_dir().join("genesis.json")
    }
}

struct Runtime {
    docker: DockerClient,
    network: NetworkId,
    test_name: String,
}

#[derive(Default)]
struct ChainState {
    runtime: Option<Runtime>,
    nodes: Vec<ChainNode>,
    host_rpc_address: Option<String>,
}

/**
   A chain running the Cosmos SDK, with a number of validators and full
   nodes each running in their own container.

   The node home directories live on the host, so that genesis files and
   node configs can be edited directly before the nodes are started.
*/
#[derive(Clone)]
pub struct CosmosChain {
    config: ChainConfig,
    num_validators: usize,
    num_full_nodes: usize,
    state: Rc<RefCell<ChainState>>,
}

impl CosmosChain {
    pub fn new(config: ChainConfig, num_validators: usize, num_full_nodes: usize) -> Self {
        Self {
            config,
            num_validators,
            num_full_nodes,
            state: Rc::new(RefCell::new(ChainState::default())),
        }
    }

    pub fn num_validators(&self) -> usize {
        self.num_validators
    }

    pub fn num_full_nodes(&self) -> usize {
        self.num_full_nodes
    }

    pub fn nodes(&self) -> Vec<ChainNode> {
        self.state.borrow().nodes.clone()
    }

    /// The path of the home directory inside the node containers.
    pub fn container_home(&self) -> String {
        format!("/var/cosmos-chain/{}", sanitize_name(&self.config.name))
    }

    fn runtime(&self) -> Result<(DockerClient, NetworkId, String), Error> {
        let state = self.state.borrow();
        let runtime = state.runtime.as_ref().ok_or_else(|| {
            eyre!("chain {} has not been initialized", self.config.chain_id)
        })?;

        Ok((
            runtime.docker.clone(),
            runtime.network.clone(),
            runtime.test_name.clone(),
        ))
    }

    /// The node that RPC clients talk to: the first full node if any.
    fn rpc_node(&self) -> Result<ChainNode, Error> {
        let state = self.state.borrow();

        state
            .nodes
            .iter()
            .find(|node| !node.validator)
            .or_else(|| state.nodes.first())
            .cloned()
            .ok_or_else(|| eyre!("chain {} has no nodes", self.config.chain_id).into())
    }

    fn node_spec(&self, node: &ChainNode, name: String, command: Vec<String>) -> Result<ContainerSpec, Error> {
        let (_, network, test_name) = self.runtime()?;

        Ok(ContainerSpec {
            name,
            image: self.config.image()?.to_string(),
            network: Some(network),
            hostname: None,
            binds: vec![Bind::new(
                node.host_home.display().to_string(),
                self.container_home(),
            )],
            exposed_ports: Vec::new(),
            labels: vec![(TEST_NAME_LABEL.to_string(), test_name)],
            user: None,
            command,
        })
    }

    /**
       Run the chain binary with the given arguments in a one-shot
       container that has the node's home mounted.
    */
    fn node_job(&self, node: &ChainNode, args: &[&str]) -> Result<ExecOutput, Error> {
        let (docker, _, _) = self.runtime()?;

        let mut command = vec![self.config.bin.clone()];
        command.extend(args.iter().map(|arg| arg.to_string()));
        command.push("--home".to_string());
        command.push(self.container_home());

        let spec = self.node_spec(node, format!("{}-job-{:x}", node.name, random_u32()), command)?;

        docker.run_job(&spec)
    }

    fn init_node(&self, node: &ChainNode) -> Result<(), Error> {
        fs::create_dir_all(&node.host_home)?;

        self.node_job(
            node,
            &["init", &node.name, "--chain-id", &self.config.chain_id],
        )?;

        Ok(())
    }

    fn add_validator_key(&self, node: &ChainNode) -> Result<String, Error> {
        let output = self.node_job(
            node,
            &[
                "keys",
                "add",
                VALIDATOR_KEY,
                "--keyring-backend",
                "test",
                "--output",
                "json",
            ],
        )?;

        parse_key_address(&output)
    }

    fn add_genesis_account(&self, node: &ChainNode, address: &str, coins: &str) -> Result<(), Error> {
        self.node_job(node, &["add-genesis-account", address, coins])?;

        Ok(())
    }

    fn gentx(&self, node: &ChainNode) -> Result<(), Error> {
        let stake = format!("{}{}", VALIDATOR_STAKE_AMOUNT, self.config.denom);

        self.node_job(
            node,
            &[
                "gentx",
                VALIDATOR_KEY,
                &stake,
                "--chain-id",
                &self.config.chain_id,
                "--keyring-backend",
                "test",
            ],
        )?;

        Ok(())
    }

    fn node_id(&self, node: &ChainNode) -> Result<String, Error> {
        let output = self.node_job(node, &["tendermint", "show-node-id"])?;

        Ok(output.stdout.trim().to_string())
    }

    /**
       Set the native denomination as the bond, mint and fee denomination
       in the node's genesis.
    */
    fn use_native_denom(&self, node: &ChainNode) -> Result<(), Error> {
        let path = node.genesis_path();
        let mut genesis: JsonValue = serde_json::from_str(&fs::read_to_string(&path)?)?;

        node_config::replace_genesis_denom(&mut genesis, "stake", &self.config.denom);

        fs::write(&path, serde_json::to_string_pretty(&genesis)?)?;

        Ok(())
    }

    fn build_genesis(&self, nodes: &[ChainNode], genesis_wallets: &[GenesisWallet]) -> Result<(), Error> {
        let validators: Vec<&ChainNode> = nodes.iter().filter(|node| node.validator).collect();

        let genesis_node = validators.first().ok_or_else(|| {
            Error::unsupported_config(format!(
                "chain {} needs at least one validator",
                self.config.chain_id
            ))
        })?;

        let validator_coins = format!("{}{}", VALIDATOR_GENESIS_AMOUNT, self.config.denom);

        let mut addresses = Vec::new();

        for validator in validators.iter() {
            self.use_native_denom(validator)?;

            let address = self.add_validator_key(validator)?;
            self.add_genesis_account(validator, &address, &validator_coins)?;
            self.gentx(validator)?;

            debug!("created gentx for validator {} at {}", validator.name, address);

            addresses.push(address);
        }

        let gentx_dir = genesis_node.config_dir().join("gentx");

        for (validator, address) in validators.iter().zip(addresses.iter()).skip(1) {
            self.add_genesis_account(genesis_node, address, &validator_coins)?;
            copy_dir_files(&validator.config_dir().join("gentx"), &gentx_dir)?;
        }

        for wallet in genesis_wallets {
            self.add_genesis_account(genesis_node, &wallet.address, &wallet.coins())?;

            info!(
                "funded wallet {} ({}) with {} in genesis of chain {}",
                wallet.key_name,
                wallet.address,
                wallet.coins(),
                self.config.chain_id
            );
        }

        self.node_job(genesis_node, &["collect-gentxs"])?;

        let genesis_path = genesis_node.genesis_path();

        for node in nodes.iter().filter(|node| node.name != genesis_node.name) {
            fs::copy(&genesis_path, node.genesis_path())?;
        }

        Ok(())
    }

    fn configure_nodes(&self, nodes: &[ChainNode]) -> Result<(), Error> {
        let mut peers = Vec::new();

        for node in nodes {
            let id = self.node_id(node)?;
            peers.push((node.name.clone(), format!("{}@{}:{}", id, node.name, P2P_PORT)));
        }

        for node in nodes {
            let node_peers: Vec<String> = peers
                .iter()
                .filter(|(name, _)| name != &node.name)
                .map(|(_, peer)| peer.clone())
                .collect();

            node_config::update_toml_file(&node.config_dir().join("config.toml"), |config| {
                node_config::set_rpc_laddr(config, RPC_PORT)?;
                node_config::set_p2p_laddr(config, P2P_PORT)?;
                node_config::set_allow_duplicate_ip(config)?;
                node_config::set_persistent_peers(config, &node_peers)?;
                node_config::set_timeout_commit(config, Duration::from_secs(1))?;
                node_config::set_timeout_propose(config, Duration::from_secs(1))?;

                Ok(())
            })?;

            node_config::update_toml_file(&node.config_dir().join("app.toml"), |config| {
                node_config::set_minimum_gas_price(config, &self.config.gas_prices)?;
                node_config::set_grpc_address(config, GRPC_PORT)?;
                node_config::disable_api(config)?;

                Ok(())
            })?;
        }

        Ok(())
    }

    fn start_node(&self, node: &ChainNode) -> Result<String, Error> {
        let (docker, _, _) = self.runtime()?;

        let mut spec = self.node_spec(
            node,
            node.name.clone(),
            vec![
                self.config.bin.clone(),
                "start".to_string(),
                "--home".to_string(),
                self.container_home(),
            ],
        )?;

        spec.hostname = Some(node.name.clone());
        spec.exposed_ports = vec![RPC_PORT, GRPC_PORT];

        docker.run_detached(&spec)
    }

    /**
       Query the latest block height through the RPC node's own binary.
    */
    pub fn query_height(&self) -> Result<u64, Error> {
        let (docker, _, _) = self.runtime()?;
        let node = self.rpc_node()?;

        let output = docker.exec(
            &node.name,
            &[
                self.config.bin.clone(),
                "status".to_string(),
                "--node".to_string(),
                format!("tcp://localhost:{RPC_PORT}"),
            ],
        )?;

        parse_latest_height(&output)
    }

    pub fn wait_for_height(&self, height: u64) -> Result<u64, Error> {
        assert_eventually_succeed(
            &format!("chain {} reaching height {}", self.config.chain_id, height),
            WAIT_FOR_BLOCKS_ATTEMPTS,
            Duration::from_secs(1),
            || {
                let current = self.query_height()?;
                if current >= height {
                    Ok(current)
                } else {
                    Err(eyre!("chain is at height {}", current).into())
                }
            },
        )
    }
}

impl ChainHandle for CosmosChain {
    type Runtime = DockerClient;

    fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn initialize(&self, options: &ChainInitOptions<DockerClient>) -> Result<(), Error> {
        if self.config.no_host_mount {
            return Err(Error::unsupported_config(format!(
                "chain {} requests no host mount, which the docker backend does not support",
                self.config.chain_id
            )));
        }

        self.config.trusting_period_duration()?;

        let image = self.config.image()?;

        if let Err(e) = options.runtime.pull_image(image) {
            warn!("failed to pull image {}, using local copy: {}", image, e);
        }

        let test_name = sanitize_name(&options.test_name);
        let chain_home = options.home_dir.join(&self.config.chain_id);

        let node_name = |role: &str, index: usize| {
            sanitize_name(&format!(
                "{}-{}-{}-{}",
                test_name, self.config.chain_id, role, index
            ))
        };

        let nodes: Vec<ChainNode> = (0..self.num_validators)
            .map(|i| (node_name("val", i), true))
            .chain((0..self.num_full_nodes).map(|i| (node_name("fn", i), false)))
            .map(|(name, validator)| ChainNode {
                host_home: chain_home.join(&name),
                name,
                validator,
                container_id: None,
            })
            .collect();

        {
            let mut state = self.state.borrow_mut();
            state.runtime = Some(Runtime {
                docker: options.runtime.clone(),
                network: options.network.clone(),
                test_name,
            });
            state.nodes = nodes.clone();
        }

        for node in &nodes {
            self.init_node(node)?;
        }

        info!(
            "initialized chain {} with {} validators and {} full nodes",
            self.config.chain_id, self.num_validators, self.num_full_nodes
        );

        Ok(())
    }

    fn start(&self, genesis_wallets: &[GenesisWallet]) -> Result<(), Error> {
        let nodes = self.nodes();

        self.build_genesis(&nodes, genesis_wallets)?;
        self.configure_nodes(&nodes)?;

        for node in &nodes {
            let container_id = self.start_node(node)?;

            let mut state = self.state.borrow_mut();
            if let Some(started) = state.nodes.iter_mut().find(|n| n.name == node.name) {
                started.container_id = Some(container_id);
            }
        }

        let height = self.wait_for_height(MIN_START_HEIGHT)?;

        let rpc_node = self.rpc_node()?;
        let (docker, _, _) = self.runtime()?;

        match docker.host_port(&rpc_node.name, RPC_PORT) {
            Ok(Some(address)) => {
                self.state.borrow_mut().host_rpc_address = Some(format!("http://{address}"));
            }
            Ok(None) => warn!("rpc port of {} is not published", rpc_node.name),
            Err(e) => warn!("failed to query host port of {}: {}", rpc_node.name, e),
        }

        info!(
            "chain {} started and reached height {}",
            self.config.chain_id, height
        );

        Ok(())
    }

    fn rpc_address(&self) -> Result<String, Error> {
        Ok(format!("http://{}:{}", self.rpc_node()?.name, RPC_PORT))
    }

    fn grpc_address(&self) -> Result<String, Error> {
        Ok(format!("{}:{}", self.rpc_node()?.name, GRPC_PORT))
    }

    fn host_rpc_address(&self) -> Option<String> {
        self.state.borrow().host_rpc_address.clone()
    }

    fn cleanup(&self) -> Result<(), Error> {
        let running: Vec<String> = self
            .state
            .borrow()
            .nodes
            .iter()
            .filter(|node| node.container_id.is_some())
            .map(|node| node.name.clone())
            .collect();

        if running.is_empty() {
            return Ok(());
        }

        let (docker, _, _) = self.runtime()?;

        let mut first_error = None;

        for name in running {
            match docker.remove_container(&name) {
                Ok(()) => {
                    let mut state = self.state.borrow_mut();
                    if let Some(node) = state.nodes.iter_mut().find(|n| n.name == name) {
                        node.container_id = None;
                    }
                }
                Err(e) => {
                    warn!("failed to remove node {}: {}", name, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn copy_dir_files(from: &Path, to: &Path) -> Result<(), Error> {
    fs::create_dir_all(to)?;

    for entry in fs::read_dir(from)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            fs::copy(entry.path(), to.join(entry.file_name()))?;
        }
    }

    Ok(())
}

/**
   Older SDK versions print command output to stderr, so look at both.
*/
fn parse_json_output(output: &ExecOutput) -> Result<JsonValue, Error> {
    serde_json::from_str(output.stdout.trim())
        .or_else(|_| serde_json::from_str(output.stderr.trim()))
        .map_err(Error::json)
}

pub fn parse_key_address(output: &ExecOutput) -> Result<String, Error> {
    let json = parse_json_output(output)?;

    let address = json
        .get("address")
        .and_then(|address| address.as_str())
        .ok_or_else(|| eyre!("expect address field in key output"))?;

    Ok(address.to_string())
}

pub fn parse_latest_height(output: &ExecOutput) -> Result<u64, Error> {
    let json = parse_json_output(output)?;

    let height = json
        .get("SyncInfo")
        .or_else(|| json.get("sync_info"))
        .and_then(|info| info.get("latest_block_height"))
        .and_then(|height| height.as_str())
        .ok_or_else(|| eyre!("expect latest_block_height in status output"))?;

    let height = height
        .parse()
        .map_err(|e| eyre!("invalid block height {}: {}", height, e))?;

    Ok(height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stdout: &str, stderr: &str) -> ExecOutput {
        ExecOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn parses_key_address_from_either_stream() {
        let json = r#"{"name":"validator","type":"local","address":"cosmos1abc","mnemonic":"word"}"#;

        assert_eq!(parse_key_address(&output(json, "")).unwrap(), "cosmos1abc");
        assert_eq!(parse_key_address(&output("", json)).unwrap(), "cosmos1abc");
        assert!(parse_key_address(&output("not json", "")).is_err());
    }

    #[test]
    fn parses_latest_height() {
        let legacy = r#"{"NodeInfo":{},"SyncInfo":{"latest_block_height":"12"}}"#;
        let current = r#"{"node_info":{},"sync_info":{"latest_block_height":"3"}}"#;

        assert_eq!(parse_latest_height(&output("", legacy)).unwrap(), 12);
        assert_eq!(parse_latest_height(&output(current, "")).unwrap(), 3);
        assert!(parse_latest_height(&output(r#"{"SyncInfo":{}}"#, "")).is_err());
    }
}
