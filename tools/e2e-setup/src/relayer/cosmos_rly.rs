/*!
   The Go relayer (`rly`), run as Docker containers.
*/

use core::cell::RefCell;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;
use tracing::info;

use crate::chain::config::DockerImage;
use crate::docker::{
    sanitize_name, Bind, ContainerSpec, DockerClient, ExecOutput, NetworkId, TEST_NAME_LABEL,
};
use crate::error::Error;
use crate::relayer::reporter::{RelayerExecReporter, RelayerExecution};
use crate::relayer::{Relayer, RelayerChainConfig, RelayerWallet};
use crate::util::random::random_u32;

/// Home directory of the relayer inside its containers.
pub const RELAYER_HOME: &str = "/home/relayer";

const RELAYER_BIN: &str = "rly";

/**
   The chain descriptor accepted by `rly chains add --file`.
*/
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RlyChainFile {
    #[serde(rename = "type")]
    pub chain_type: String,
    pub value: RlyChainValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RlyChainValue {
    pub key: String,
    pub chain_id: String,
    pub rpc_addr: String,
    pub grpc_addr: String,
    pub account_prefix: String,
    pub keyring_backend: String,
    pub gas_adjustment: f64,
    pub gas_prices: String,
    pub debug: bool,
    pub timeout: String,
    pub output_format: String,
    pub sign_mode: String,
}

impl RlyChainFile {
    pub fn new(chain: &RelayerChainConfig) -> Self {
        Self {
            chain_type: chain.chain.chain_type.clone(),
            value: RlyChainValue {
                key: chain.key_name.clone(),
                chain_id: chain.chain.chain_id.clone(),
                rpc_addr: chain.rpc_address.clone(),
                grpc_addr: chain.grpc_address.clone(),
                account_prefix: chain.chain.bech32_prefix.clone(),
                keyring_backend: "test".to_string(),
                gas_adjustment: chain.chain.gas_adjustment,
                gas_prices: chain.chain.gas_prices.clone(),
                debug: true,
                timeout: "10s".to_string(),
                output_format: "json".to_string(),
                sign_mode: "direct".to_string(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct RlyKeyOutput {
    mnemonic: String,
    address: String,
}

#[derive(Default)]
struct RelayerState {
    config_initialized: bool,
    container: Option<String>,
}

/**
   A Go relayer sharing one home directory across all of its commands.

   Each command runs in a one-shot container on the test network. The
   relayer process started by [`Relayer::start_relayer`] runs in a
   long-lived container until [`Relayer::stop_relayer`] is called.
*/
#[derive(Clone)]
pub struct CosmosRelayer {
    test_name: String,
    docker: DockerClient,
    network: NetworkId,
    image: DockerImage,
    host_home: PathBuf,
    state: Rc<RefCell<RelayerState>>,
}

impl CosmosRelayer {
    pub fn new(
        test_name: &str,
        docker: DockerClient,
        network: NetworkId,
        image: DockerImage,
        home_dir: &Path,
    ) -> Self {
        Self {
            test_name: sanitize_name(test_name),
            docker,
            network,
            image,
            host_home: home_dir.join("relayer"),
            state: Rc::new(RefCell::new(RelayerState::default())),
        }
    }

    pub fn host_home(&self) -> &Path {
        &self.host_home
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().container.is_some()
    }

    fn container_spec(&self, name: String, args: &[&str]) -> ContainerSpec {
        let mut command = vec![RELAYER_BIN.to_string()];
        command.extend(args.iter().map(|arg| arg.to_string()));
        command.push("--home".to_string());
        command.push(RELAYER_HOME.to_string());

        ContainerSpec {
            name,
            image: self.image.to_string(),
            network: Some(self.network.clone()),
            hostname: None,
            binds: vec![Bind::new(self.host_home.display().to_string(), RELAYER_HOME)],
            exposed_ports: Vec::new(),
            labels: vec![(TEST_NAME_LABEL.to_string(), self.test_name.clone())],
            user: None,
            command,
        }
    }

    /**
       Run a relayer command to completion and report it.
    */
    fn exec(&self, reporter: &mut RelayerExecReporter, args: &[&str]) -> Result<ExecOutput, Error> {
        let name = format!("{}-rly-{:x}", self.test_name, random_u32());
        let spec = self.container_spec(name, args);

        let start = Instant::now();
        let result = self.docker.run_job(&spec);

        let (success, stdout, stderr) = match &result {
            Ok(output) => (true, output.stdout.clone(), output.stderr.clone()),
            Err(e) => (false, String::new(), e.to_string()),
        };

        reporter.track_relayer_exec(RelayerExecution {
            command: spec.command.clone(),
            success,
            stdout,
            stderr,
            elapsed: start.elapsed(),
        });

        result
    }

    fn ensure_config(&self, reporter: &mut RelayerExecReporter) -> Result<(), Error> {
        if self.state.borrow().config_initialized {
            return Ok(());
        }

        fs::create_dir_all(&self.host_home)?;

        self.exec(reporter, &["config", "init"])?;

        self.state.borrow_mut().config_initialized = true;

        Ok(())
    }
}

impl Relayer for CosmosRelayer {
    fn add_chain_configuration(
        &self,
        reporter: &mut RelayerExecReporter,
        chain: &RelayerChainConfig,
    ) -> Result<(), Error> {
        self.ensure_config(reporter)?;

        let chain_id = &chain.chain.chain_id;
        let file_name = format!("{chain_id}.json");

        let content = serde_json::to_string_pretty(&RlyChainFile::new(chain))?;
        fs::write(self.host_home.join(&file_name), content)?;

        let container_file = format!("{RELAYER_HOME}/{file_name}");

        self.exec(reporter, &["chains", "add", "--file", &container_file, chain_id])?;

        info!("added chain {} to relayer configuration", chain_id);

        Ok(())
    }

    fn add_key(
        &self,
        reporter: &mut RelayerExecReporter,
        chain_id: &str,
        key_name: &str,
    ) -> Result<RelayerWallet, Error> {
        let output = self.exec(reporter, &["keys", "add", chain_id, key_name])?;

        let key: RlyKeyOutput = serde_json::from_str(output.stdout.trim())?;

        Ok(RelayerWallet {
            chain_id: chain_id.to_string(),
            key_name: key_name.to_string(),
            address: key.address,
            mnemonic: key.mnemonic,
        })
    }

    fn generate_path(
        &self,
        reporter: &mut RelayerExecReporter,
        src_chain_id: &str,
        dst_chain_id: &str,
        path_name: &str,
    ) -> Result<(), Error> {
        self.exec(
            reporter,
            &["paths", "new", src_chain_id, dst_chain_id, path_name],
        )?;

        Ok(())
    }

    fn link_path(
        &self,
        reporter: &mut RelayerExecReporter,
        path_name: &str,
        client_trusting_period: &str,
    ) -> Result<(), Error> {
        self.exec(
            reporter,
            &["tx", "link", path_name, "--client-tp", client_trusting_period],
        )?;

        info!(
            "relayer linked path {} with client trusting period {}",
            path_name, client_trusting_period
        );

        Ok(())
    }

    fn start_relayer(
        &self,
        reporter: &mut RelayerExecReporter,
        path_names: &[&str],
    ) -> Result<(), Error> {
        if self.is_running() {
            return Err(Error::unsupported_config(
                "relayer is already running".to_string(),
            ));
        }

        let mut args = vec!["start"];
        args.extend_from_slice(path_names);

        let name = format!("{}-rly-start-{:x}", self.test_name, random_u32());
        let spec = self.container_spec(name.clone(), &args);

        let start = Instant::now();
        let result = self.docker.run_detached(&spec);

        reporter.track_relayer_exec(RelayerExecution {
            command: spec.command.clone(),
            success: result.is_ok(),
            stdout: result.as_ref().map(Clone::clone).unwrap_or_default(),
            stderr: result
                .as_ref()
                .err()
                .map(ToString::to_string)
                .unwrap_or_default(),
            elapsed: start.elapsed(),
        });

        result?;

        self.state.borrow_mut().container = Some(name);

        Ok(())
    }

    fn stop_relayer(&self, reporter: &mut RelayerExecReporter) -> Result<(), Error> {
        let container = self.state.borrow_mut().container.take();

        if let Some(container) = container {
            let start = Instant::now();
            let result = self.docker.remove_container(&container);

            reporter.track_relayer_exec(RelayerExecution {
                command: vec!["docker".to_string(), "rm".to_string(), container.clone()],
                success: result.is_ok(),
                stdout: String::new(),
                stderr: result
                    .as_ref()
                    .err()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                elapsed: start.elapsed(),
            });

            result?;

            info!("stopped relayer container {}", container);
        }

        Ok(())
    }
}
