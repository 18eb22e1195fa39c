/*!
   The standard two-chain test environment: two `simd` chains, each with
   one validator and one full node, linked over a single path by a Go
   relayer.
*/

use std::path::PathBuf;
use tracing::info;

use crate::chain::config::{new_simapp_config, ChainConfig};
use crate::chain::handle::ChainHandle;
use crate::docker::NetworkId;
use crate::error::Error;
use crate::framework::interchain::{Interchain, InterchainBuildOptions, InterchainLink};
use crate::infra::Infrastructure;
use crate::relayer::reporter::RelayerExecReporter;
use crate::relayer::{Relayer, RelayerKind};
use crate::types::context::TestContext;
use crate::types::env::{prefix_writer, write_env, EnvWriter, ExportEnv};
use crate::util::assert::Require;

/// The name of the path that the relayer links the two chains over.
pub const TEST_PATH: &str = "test-path";

/// The name the relayer is registered under in the topology.
pub const RELAYER_NAME: &str = "r";

/// Name of the file in the home directory that the environment is exported to.
pub const ENV_FILE_NAME: &str = "environment.env";

/**
   Allows for arbitrary configuration of the setup [`Options`].

   Configuration functions are applied in the order they are given, so
   the last one to set a field wins.
*/
pub type ConfigurationFunc = Box<dyn FnOnce(&mut Options)>;

/**
   Holds the values that can be configured before the environment is
   created.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub chain_a_config: ChainConfig,
    pub chain_b_config: ChainConfig,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            chain_a_config: new_simapp_config("simapp-a", "chain-a", "atoma"),
            chain_b_config: new_simapp_config("simapp-b", "chain-b", "atomb"),
        }
    }
}

impl Options {
    /// Start from the defaults and apply `config_funcs` in order.
    pub fn with_config_funcs(config_funcs: impl IntoIterator<Item = ConfigurationFunc>) -> Self {
        let mut opts = Self::default();

        for config_func in config_funcs {
            config_func(&mut opts);
        }

        opts
    }
}

pub fn with_chain_a_config(config: ChainConfig) -> ConfigurationFunc {
    Box::new(move |opts| opts.chain_a_config = config)
}

pub fn with_chain_b_config(config: ChainConfig) -> ConfigurationFunc {
    Box::new(move |opts| opts.chain_b_config = config)
}

/**
   Run chain A on a different native denomination. Gas prices follow the
   new denomination.
*/
pub fn with_chain_a_denom(denom: &str) -> ConfigurationFunc {
    let denom = denom.to_string();
    Box::new(move |opts| set_denom(&mut opts.chain_a_config, denom))
}

pub fn with_chain_b_denom(denom: &str) -> ConfigurationFunc {
    let denom = denom.to_string();
    Box::new(move |opts| set_denom(&mut opts.chain_b_config, denom))
}

fn set_denom(config: &mut ChainConfig, denom: String) {
    config.gas_prices = format!("0.01{denom}");
    config.denom = denom;
}

/**
   The live handles of a standard two-chain environment.

   The relayer has been configured and has linked the two chains, but
   is not running. Start it with
   [`Relayer::start_relayer`](crate::relayer::Relayer::start_relayer)
   over [`TEST_PATH`] once the test is ready to have packets relayed.
*/
pub struct StandardEnvironment<Chain, Rly> {
    pub chain_a: Chain,
    pub chain_b: Chain,
    pub relayer: Rly,
    pub home_dir: PathBuf,
    pub network: NetworkId,
}

impl<Chain: ChainHandle, Rly> ExportEnv for StandardEnvironment<Chain, Rly> {
    fn export_env(&self, writer: &mut impl EnvWriter) {
        writer.write_env("HOME_DIR", &self.home_dir.display().to_string());
        writer.write_env("NETWORK", &self.network.0);
        writer.write_env("PATH_NAME", TEST_PATH);

        for (prefix, chain) in [("CHAIN_A", &self.chain_a), ("CHAIN_B", &self.chain_b)] {
            let mut writer = prefix_writer(prefix, &mut *writer);

            chain.config().export_env(&mut writer);

            if let Some(address) = chain.host_rpc_address() {
                writer.write_env("RPC_ADDR", &address);
            }
        }
    }
}

/**
   Creates two default `simd` chains as well as a Go relayer, all running
   in containers, and links the chains over [`TEST_PATH`].

   Any failure during setup fails the test through `req`, so no partially
   built environment is ever returned. The chains are cleaned up when
   the test context runs its cleanups, whether setup succeeded or not.
*/
pub fn standard_two_chain_environment<Infra>(
    test: &impl TestContext,
    infra: &Infra,
    req: &impl Require,
    reporter: &mut RelayerExecReporter,
    config_funcs: impl IntoIterator<Item = ConfigurationFunc>,
) -> StandardEnvironment<Infra::Chain, Infra::Relayer>
where
    Infra: Infrastructure,
    Infra::Chain: 'static,
    Infra::Relayer: 'static,
{
    req.no_error(try_standard_two_chain_environment(
        test,
        infra,
        reporter,
        config_funcs,
    ))
}

/**
   Like [`standard_two_chain_environment`], but returns setup errors
   instead of failing the test.
*/
pub fn try_standard_two_chain_environment<Infra>(
    test: &impl TestContext,
    infra: &Infra,
    reporter: &mut RelayerExecReporter,
    config_funcs: impl IntoIterator<Item = ConfigurationFunc>,
) -> Result<StandardEnvironment<Infra::Chain, Infra::Relayer>, Error>
where
    Infra: Infrastructure,
    Infra::Chain: 'static,
    Infra::Relayer: 'static,
{
    let opts = Options::with_config_funcs(config_funcs);

    let (runtime, network) = infra.setup(test)?;

    // Must be created before the chain cleanup is registered, so that it
    // is removed after the chains.
    let home_dir = test.temp_dir()?;

    let chain_a = infra.new_chain(test.name(), opts.chain_a_config, 1, 1)?;
    let chain_b = infra.new_chain(test.name(), opts.chain_b_config, 1, 1)?;

    register_chain_cleanup(test, vec![chain_a.clone(), chain_b.clone()]);

    let relayer = infra.new_relayer(
        RelayerKind::CosmosRly,
        test,
        &runtime,
        &network,
        &home_dir,
    )?;

    // Registered last so that a started relayer is stopped while its
    // home directory still exists.
    register_relayer_cleanup(test, relayer.clone());

    let link = InterchainLink::new(&chain_a, &chain_b, RELAYER_NAME, TEST_PATH);

    let interchain = Interchain::new()
        .add_chain(chain_a.clone())
        .add_chain(chain_b.clone())
        .add_relayer(relayer.clone(), RELAYER_NAME)
        .add_link(link);

    interchain.build(
        reporter,
        InterchainBuildOptions {
            test_name: test.name().to_string(),
            home_dir: home_dir.clone(),
            runtime,
            network: network.clone(),
            skip_path_creation: false,
        },
    )?;

    let environment = StandardEnvironment {
        chain_a,
        chain_b,
        relayer,
        home_dir,
        network,
    };

    let env_path = environment.home_dir.join(ENV_FILE_NAME);
    write_env(&env_path, &environment)?;

    info!(
        "created two-chain environment for chains {} and {}, written environment to {}",
        environment.chain_a.chain_id(),
        environment.chain_b.chain_id(),
        env_path.display()
    );

    Ok(environment)
}

/**
   Register a cleanup that cleans up each chain in turn. A failure is
   written to the test log and does not prevent the remaining chains
   from being cleaned up.
*/
pub fn register_chain_cleanup<Chain>(test: &impl TestContext, chains: Vec<Chain>)
where
    Chain: ChainHandle + 'static,
{
    let logger = test.logger();

    test.register_cleanup(Box::new(move || {
        for chain in chains {
            if let Err(e) = chain.cleanup() {
                logger.log(&format!(
                    "Chain cleanup for {} failed: {}",
                    chain.chain_id(),
                    e
                ));
            }
        }
    }));
}

/**
   Register a cleanup that stops the relayer if a test started it. A
   failure is written to the test log.
*/
pub fn register_relayer_cleanup<Rly>(test: &impl TestContext, relayer: Rly)
where
    Rly: Relayer + 'static,
{
    let logger = test.logger();

    test.register_cleanup(Box::new(move || {
        let mut reporter = RelayerExecReporter::new();

        if let Err(e) = relayer.stop_relayer(&mut reporter) {
            logger.log(&format!("Relayer cleanup failed: {e}"));
        }
    }));
}
