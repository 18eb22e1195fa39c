/*!
   Drives the Docker backend against an in-memory container runtime,
   which mimics the effects of `simd` and `rly` on the mounted home
   directories.
*/

use core::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::bootstrap::init::init_test;
use crate::bootstrap::two_chain::{
    try_standard_two_chain_environment, with_chain_a_config, with_chain_a_denom,
    with_chain_b_config, ENV_FILE_NAME, TEST_PATH,
};
use crate::chain::config::{new_simapp_config_with, ChainConfig, DockerImage};
use crate::chain::cosmos::CosmosChain;
use crate::chain::handle::{ChainHandle, ChainInitOptions};
use crate::docker::{
    ContainerRuntime, ContainerSpec, DockerClient, ExecOutput, NetworkId, TEST_NAME_LABEL,
};
use crate::error::Error;
use crate::infra::DockerInfrastructure;
use crate::relayer::reporter::RelayerExecReporter;
use crate::relayer::{BuiltinRelayerFactory, Relayer, RelayerKind};
use crate::types::config::TestConfig;
use crate::types::context::TestScope;

const GENESIS: &str = r#"{
  "chain_id": "test",
  "app_state": {
    "staking": { "params": { "bond_denom": "stake" } },
    "mint": { "params": { "mint_denom": "stake" } },
    "crisis": { "constant_fee": { "denom": "stake", "amount": "1000" } }
  }
}"#;

const CONFIG_TOML: &str = r#"
log_level = "info"

[rpc]
laddr = "tcp://127.0.0.1:26657"

[p2p]
laddr = "tcp://0.0.0.0:26656"
persistent_peers = ""
allow_duplicate_ip = false

[consensus]
timeout_commit = "5s"
timeout_propose = "3s"
"#;

const APP_TOML: &str = r#"
minimum-gas-prices = ""

[api]
enable = true

[grpc]
address = "0.0.0.0:9090"
"#;

/**
   An in-memory container runtime that records every call. Jobs are
   simulated against the first mounted host directory.
*/
#[derive(Default)]
struct FakeDocker {
    calls: RefCell<Vec<String>>,
    fail_pull: bool,

    /// Host directories mounted by each running container.
    mounts: RefCell<HashMap<String, Vec<PathBuf>>>,

    /// Containers removed, and whether their mounts still existed.
    removed: RefCell<Vec<(String, bool)>>,
}

fn node_label(home: &Path) -> String {
    home.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl FakeDocker {
    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn removed(&self) -> Vec<(String, bool)> {
        self.removed.borrow().clone()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn simulate_job(&self, spec: &ContainerSpec) -> Result<String, Error> {
        let home = spec
            .binds
            .first()
            .map(|bind| PathBuf::from(&bind.host_path))
            .unwrap_or_default();

        // skip the binary name
        let command: Vec<&str> = spec.command.iter().skip(1).map(String::as_str).collect();

        let stdout = match command.as_slice() {
            ["init", ..] => {
                let config = home.join("config");
                fs::create_dir_all(&config)?;
                fs::write(config.join("genesis.json"), GENESIS)?;
                fs::write(config.join("config.toml"), CONFIG_TOML)?;
                fs::write(config.join("app.toml"), APP_TOML)?;
                String::new()
            }
            ["keys", "add", "validator", ..] => {
                format!(r#"{{"name":"validator","address":"cosmos1{}"}}"#, node_label(&home))
            }
            ["gentx", ..] => {
                let gentx = home.join("config").join("gentx");
                fs::create_dir_all(&gentx)?;
                fs::write(gentx.join(format!("gentx-{}.json", node_label(&home))), "{}")?;
                String::new()
            }
            ["tendermint", "show-node-id", ..] => format!("id-{}\n", node_label(&home)),
            ["keys", "add", chain_id, ..] => {
                format!(r#"{{"mnemonic":"abandon","address":"cosmos1rly{chain_id}"}}"#)
            }
            _ => String::new(),
        };

        Ok(stdout)
    }
}

impl ContainerRuntime for FakeDocker {
    fn create_network(&self, name: &str, test_name: &str) -> Result<NetworkId, Error> {
        self.record(format!("network create {name} {TEST_NAME_LABEL}={test_name}"));
        Ok(NetworkId(name.to_string()))
    }

    fn remove_network(&self, network: &NetworkId) -> Result<(), Error> {
        self.record(format!("network rm {network}"));
        Ok(())
    }

    fn pull_image(&self, image: &DockerImage) -> Result<(), Error> {
        self.record(format!("pull {image}"));

        if self.fail_pull {
            return Err(Error::command_failed(
                format!("pull {image}"),
                None,
                "manifest unknown".to_string(),
            ));
        }

        Ok(())
    }

    fn run_job(&self, spec: &ContainerSpec) -> Result<ExecOutput, Error> {
        self.record(format!("job {} {}", spec.image, spec.command_line()));

        Ok(ExecOutput {
            stdout: self.simulate_job(spec)?,
            stderr: String::new(),
        })
    }

    fn run_detached(&self, spec: &ContainerSpec) -> Result<String, Error> {
        self.record(format!("run {} {} {}", spec.name, spec.image, spec.command_line()));

        self.mounts.borrow_mut().insert(
            spec.name.clone(),
            spec.binds.iter().map(|bind| PathBuf::from(&bind.host_path)).collect(),
        );

        Ok(format!("{}-id", spec.name))
    }

    fn exec(&self, container: &str, command: &[String]) -> Result<ExecOutput, Error> {
        self.record(format!("exec {} {}", container, command.join(" ")));

        Ok(ExecOutput {
            stdout: r#"{"sync_info":{"latest_block_height":"5"}}"#.to_string(),
            stderr: String::new(),
        })
    }

    fn remove_container(&self, container: &str) -> Result<(), Error> {
        self.record(format!("rm {container}"));

        if let Some(mounts) = self.mounts.borrow_mut().remove(container) {
            let mounted = mounts.iter().all(|path| path.is_dir());
            self.removed.borrow_mut().push((container.to_string(), mounted));
        }

        Ok(())
    }

    fn remove_labelled_containers(&self, test_name: &str) -> Result<(), Error> {
        self.record(format!("rm label {TEST_NAME_LABEL}={test_name}"));
        Ok(())
    }

    fn host_port(&self, container: &str, port: u16) -> Result<Option<String>, Error> {
        self.record(format!("port {container} {port}"));
        Ok(Some("127.0.0.1:49153".to_string()))
    }
}

fn test_config() -> TestConfig {
    TestConfig {
        simd_image: "simd".to_string(),
        simd_tag: "v1".to_string(),
        rly_image: "rly".to_string(),
        rly_tag: "v2".to_string(),
    }
}

fn chain_config(chain_id: &str, denom: &str) -> ChainConfig {
    new_simapp_config_with(&test_config(), chain_id, chain_id, denom)
}

#[test]
fn builds_two_chain_environment_in_docker() {
    init_test();

    let base = tempfile::tempdir().unwrap();
    let test = TestScope::new("docker").with_base_dir(base.path());
    let fake = Rc::new(FakeDocker::default());
    let infra = DockerInfrastructure::new(&test_config(), fake.clone());
    let mut reporter = RelayerExecReporter::new();

    let env = try_standard_two_chain_environment(
        &test,
        &infra,
        &mut reporter,
        vec![
            with_chain_a_config(chain_config("chain-a", "atoma")),
            with_chain_b_config(chain_config("chain-b", "atomb")),
            with_chain_a_denom("foo"),
        ],
    )
    .unwrap();

    assert_eq!(env.chain_a.nodes().len(), 2);
    assert_eq!(
        env.chain_a.rpc_address().unwrap(),
        "http://docker-chain-a-fn-0:26657"
    );
    assert_eq!(
        env.chain_a.host_rpc_address().as_deref(),
        Some("http://127.0.0.1:49153")
    );

    // the validator's genesis is copied to the full node
    let full_node = &env.chain_a.nodes()[1];
    let genesis = fs::read_to_string(full_node.host_home.join("config/genesis.json")).unwrap();
    assert!(genesis.contains("\"bond_denom\": \"foo\""));
    assert!(!genesis.contains("stake"));

    let config = fs::read_to_string(full_node.host_home.join("config/config.toml")).unwrap();
    assert!(config.contains("id-docker-chain-a-val-0@docker-chain-a-val-0:26656"));
    assert!(config.contains("allow_duplicate_ip = true"));

    let app = fs::read_to_string(full_node.host_home.join("config/app.toml")).unwrap();
    assert!(app.contains("0.01foo"));
    assert!(!app.contains("enable = true"));

    let calls = fake.calls();

    assert!(calls[0].starts_with("network create ibc-e2e-"));
    assert!(calls[0].ends_with(&format!("{TEST_NAME_LABEL}=docker")));
    assert!(calls.iter().any(|c| c == "pull simd:v1"));
    assert!(calls.iter().any(|c| c
        == "job simd:v1 simd add-genesis-account cosmos1rlychain-a 10000000000000foo --home /var/cosmos-chain/chain-a"));
    assert!(calls
        .iter()
        .any(|c| c.starts_with("run docker-chain-b-fn-0 simd:v1 simd start")));

    let chain_file = env.home_dir.join("relayer").join("chain-a.json");
    assert!(chain_file.is_file());

    let env_file = fs::read_to_string(env.home_dir.join(ENV_FILE_NAME)).unwrap();
    assert!(env_file.contains("CHAIN_A_RPC_ADDR=http://127.0.0.1:49153"));
    assert!(env_file.contains("CHAIN_A_IMAGE=simd:v1"));

    env.relayer.start_relayer(&mut reporter, &[TEST_PATH]).unwrap();
    env.relayer.stop_relayer(&mut reporter).unwrap();
    assert_eq!(reporter.failures().count(), 0);

    drop(test);

    let calls = fake.calls();
    assert!(calls.iter().any(|c| c == "rm docker-chain-a-val-0"));
    assert!(calls.iter().any(|c| c == "rm docker-chain-b-fn-0"));
    assert!(calls
        .iter()
        .any(|c| c == &format!("rm label {TEST_NAME_LABEL}=docker")));
    assert!(calls.last().unwrap().starts_with("network rm ibc-e2e-"));
    assert!(!env.home_dir.exists());
}

#[test]
fn links_path_with_chain_trusting_period() {
    let base = tempfile::tempdir().unwrap();
    let test = TestScope::new("link").with_base_dir(base.path());
    let fake = Rc::new(FakeDocker::default());
    let infra = DockerInfrastructure::new(&test_config(), fake.clone());
    let mut reporter = RelayerExecReporter::new();

    try_standard_two_chain_environment(
        &test,
        &infra,
        &mut reporter,
        vec![
            with_chain_a_config(chain_config("chain-a", "atoma")),
            with_chain_b_config(chain_config("chain-b", "atomb")),
        ],
    )
    .unwrap();

    assert!(fake.calls().iter().any(|c| c
        == &format!("job rly:v2 rly tx link {TEST_PATH} --client-tp 508h --home /home/relayer")));

    let link = reporter
        .executions()
        .iter()
        .find(|e| e.command.get(1).map(String::as_str) == Some("tx"))
        .unwrap();
    assert!(link.command_line().contains("--client-tp 508h"));
}

#[test]
fn running_relayer_is_removed_before_home_dir() {
    let base = tempfile::tempdir().unwrap();
    let test = TestScope::new("stop").with_base_dir(base.path());
    let fake = Rc::new(FakeDocker::default());
    let infra = DockerInfrastructure::new(&test_config(), fake.clone());
    let mut reporter = RelayerExecReporter::new();

    let env = try_standard_two_chain_environment(
        &test,
        &infra,
        &mut reporter,
        vec![
            with_chain_a_config(chain_config("chain-a", "atoma")),
            with_chain_b_config(chain_config("chain-b", "atomb")),
        ],
    )
    .unwrap();

    // started by the test and never stopped
    env.relayer.start_relayer(&mut reporter, &[TEST_PATH]).unwrap();
    assert!(env.relayer.is_running());

    drop(test);

    let removed = fake.removed();
    let relayer = removed
        .iter()
        .find(|(name, _)| name.starts_with("stop-rly-start-"))
        .unwrap();

    // the relayer home was still mounted when its container was removed
    assert!(relayer.1);
    assert_eq!(removed.first(), Some(relayer));
    assert!(!env.relayer.is_running());
    assert!(!env.home_dir.exists());
}

#[test]
fn failed_pull_falls_back_to_local_image() {
    let home = tempfile::tempdir().unwrap();
    let fake = Rc::new(FakeDocker {
        fail_pull: true,
        ..FakeDocker::default()
    });

    let chain = CosmosChain::new(chain_config("chain-a", "atoma"), 1, 0);

    chain
        .initialize(&ChainInitOptions {
            test_name: "pull".to_string(),
            home_dir: home.path().to_path_buf(),
            runtime: fake.clone() as DockerClient,
            network: NetworkId("net".to_string()),
        })
        .unwrap();

    assert_eq!(fake.calls()[0], "pull simd:v1");
    assert!(home
        .path()
        .join("chain-a/pull-chain-a-val-0/config/genesis.json")
        .is_file());

    // nothing was started, so there is nothing to remove
    chain.cleanup().unwrap();
    assert!(!fake.calls().iter().any(|c| c.starts_with("rm ")));
}

#[test]
fn rejects_chains_without_host_mount() {
    let home = tempfile::tempdir().unwrap();
    let fake = Rc::new(FakeDocker::default());

    let chain = CosmosChain::new(
        ChainConfig {
            no_host_mount: true,
            ..chain_config("chain-a", "atoma")
        },
        1,
        1,
    );

    let res = chain.initialize(&ChainInitOptions {
        test_name: "mount".to_string(),
        home_dir: home.path().to_path_buf(),
        runtime: fake.clone() as DockerClient,
        network: NetworkId("net".to_string()),
    });

    assert!(res.is_err());
    assert!(fake.calls().is_empty());
}

#[test]
fn factory_builds_go_relayer() {
    let home = tempfile::tempdir().unwrap();
    let test = TestScope::new("factory");
    let docker: DockerClient = Rc::new(FakeDocker::default());

    let factory = BuiltinRelayerFactory::new(RelayerKind::CosmosRly, DockerImage::new("rly", "v2"));
    let relayer = factory.build(&test, &docker, &NetworkId("net".to_string()), home.path());

    assert_eq!(relayer.host_home(), home.path().join("relayer"));
    assert!(!relayer.is_running());
}
