/*!
   The interchain topology builder.
*/

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use tracing::info;

use crate::chain::handle::{ChainHandle, ChainInitOptions, GenesisWallet};
use crate::docker::NetworkId;
use crate::error::Error;
use crate::relayer::reporter::RelayerExecReporter;
use crate::relayer::{Relayer, RelayerChainConfig};

/// Amount that each relayer key is funded with in the chain genesis.
pub const RELAYER_WALLET_AMOUNT: u128 = 10_000_000_000_000;

/**
   A named path between two chains, served by one relayer.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterchainLink {
    pub chain1: String,
    pub chain2: String,
    pub relayer: String,
    pub path: String,
}

impl InterchainLink {
    pub fn new<Chain: ChainHandle>(
        chain1: &Chain,
        chain2: &Chain,
        relayer_name: &str,
        path: &str,
    ) -> Self {
        Self {
            chain1: chain1.chain_id().to_string(),
            chain2: chain2.chain_id().to_string(),
            relayer: relayer_name.to_string(),
            path: path.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InterchainBuildOptions<Runtime> {
    pub test_name: String,
    pub home_dir: PathBuf,
    pub runtime: Runtime,
    pub network: NetworkId,

    /**
       Only configure the relayers for their chains, without creating the
       paths or linking them.
    */
    pub skip_path_creation: bool,
}

/**
   Accumulates chains, relayers and links, which are then created
   together by a single call to [`build`](Interchain::build).
*/
pub struct Interchain<Chain, Rly> {
    chains: Vec<Chain>,
    relayers: Vec<(String, Rly)>,
    links: Vec<InterchainLink>,
}

impl<Chain, Rly> Default for Interchain<Chain, Rly> {
    fn default() -> Self {
        Self {
            chains: Vec::new(),
            relayers: Vec::new(),
            links: Vec::new(),
        }
    }
}

impl<Chain: ChainHandle, Rly: Relayer> Interchain<Chain, Rly> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_chain(mut self, chain: Chain) -> Self {
        self.chains.push(chain);
        self
    }

    pub fn add_relayer(mut self, relayer: Rly, name: &str) -> Self {
        self.relayers.push((name.to_string(), relayer));
        self
    }

    pub fn add_link(mut self, link: InterchainLink) -> Self {
        self.links.push(link);
        self
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn links(&self) -> &[InterchainLink] {
        &self.links
    }

    fn chain(&self, chain_id: &str) -> Option<&Chain> {
        self.chains
            .iter()
            .find(|chain| chain.chain_id() == chain_id)
    }

    fn relayer(&self, name: &str) -> Option<&Rly> {
        self.relayers
            .iter()
            .find(|(relayer_name, _)| relayer_name == name)
            .map(|(_, relayer)| relayer)
    }

    /**
       The trusting period for the clients of a link: the shorter of the
       two chains' trusting periods, so that neither client outlives
       what its counterparty allows.
    */
    fn link_trusting_period(&self, link: &InterchainLink) -> Result<String, Error> {
        let mut shortest: Option<(core::time::Duration, &str)> = None;

        for chain_id in [&link.chain1, &link.chain2] {
            let chain = self.chain(chain_id).ok_or_else(|| {
                Error::invalid_topology(format!("unknown chain {chain_id}"))
            })?;

            let config = chain.config();
            let duration = config.trusting_period_duration()?;

            if shortest.map_or(true, |(current, _)| duration < current) {
                shortest = Some((duration, config.trusting_period.as_str()));
            }
        }

        shortest
            .map(|(_, period)| period.to_string())
            .ok_or_else(|| Error::invalid_topology(format!("link {} has no chains", link.path)))
    }

    /**
       Check that the topology is consistent before anything is created.
    */
    pub fn validate(&self) -> Result<(), Error> {
        if self.chains.is_empty() {
            return Err(Error::invalid_topology("no chains added".to_string()));
        }

        let mut chain_ids = HashSet::new();
        for chain in &self.chains {
            if !chain_ids.insert(chain.chain_id()) {
                return Err(Error::invalid_topology(format!(
                    "duplicate chain id {}",
                    chain.chain_id()
                )));
            }
        }

        let mut relayer_names = HashSet::new();
        for (name, _) in &self.relayers {
            if !relayer_names.insert(name.as_str()) {
                return Err(Error::invalid_topology(format!(
                    "duplicate relayer name {name}"
                )));
            }
        }

        for link in &self.links {
            for chain_id in [&link.chain1, &link.chain2] {
                if self.chain(chain_id).is_none() {
                    return Err(Error::invalid_topology(format!(
                        "link {} refers to unknown chain {}",
                        link.path, chain_id
                    )));
                }
            }

            if link.chain1 == link.chain2 {
                return Err(Error::invalid_topology(format!(
                    "link {} must join two distinct chains",
                    link.path
                )));
            }

            if self.relayer(&link.relayer).is_none() {
                return Err(Error::invalid_topology(format!(
                    "link {} refers to unknown relayer {}",
                    link.path, link.relayer
                )));
            }
        }

        Ok(())
    }

    /**
       Create every chain and relayer and link them.

       The steps are:

       1. Initialize every chain.
       2. Configure each relayer for the chains its links touch, creating
          one relayer key per chain.
       3. Start every chain, funding the relayer keys in the genesis.
       4. Create and link every path, unless
          [`skip_path_creation`](InterchainBuildOptions::skip_path_creation)
          is set.

       The topology is consumed, so it cannot be built twice.
    */
    pub fn build(
        self,
        reporter: &mut RelayerExecReporter,
        options: InterchainBuildOptions<Chain::Runtime>,
    ) -> Result<(), Error> {
        self.validate()?;

        let init_options = ChainInitOptions {
            test_name: options.test_name.clone(),
            home_dir: options.home_dir.clone(),
            runtime: options.runtime.clone(),
            network: options.network.clone(),
        };

        for chain in &self.chains {
            chain.initialize(&init_options)?;
        }

        let mut genesis_wallets: BTreeMap<String, Vec<GenesisWallet>> = BTreeMap::new();

        for (name, relayer) in &self.relayers {
            for chain in self.chains_of_relayer(name) {
                let chain_id = chain.chain_id().to_string();

                let chain_config = RelayerChainConfig {
                    chain: chain.config().clone(),
                    rpc_address: chain.rpc_address()?,
                    grpc_address: chain.grpc_address()?,
                    key_name: chain_id.clone(),
                };

                relayer.add_chain_configuration(reporter, &chain_config)?;

                let wallet = relayer.add_key(reporter, &chain_id, &chain_config.key_name)?;

                genesis_wallets
                    .entry(chain_id)
                    .or_default()
                    .push(GenesisWallet {
                        key_name: format!("{}-{}", name, wallet.key_name),
                        address: wallet.address,
                        amount: RELAYER_WALLET_AMOUNT,
                        denom: chain.config().denom.clone(),
                    });
            }
        }

        for chain in &self.chains {
            let wallets = genesis_wallets
                .get(chain.chain_id())
                .map(Vec::as_slice)
                .unwrap_or_default();

            chain.start(wallets)?;
        }

        if options.skip_path_creation {
            return Ok(());
        }

        for link in &self.links {
            let relayer = self.relayer(&link.relayer).ok_or_else(|| {
                Error::invalid_topology(format!("unknown relayer {}", link.relayer))
            })?;

            let trusting_period = self.link_trusting_period(link)?;

            relayer.generate_path(reporter, &link.chain1, &link.chain2, &link.path)?;
            relayer.link_path(reporter, &link.path, &trusting_period)?;

            info!(
                "linked chain {} and chain {} over path {} with relayer {}",
                link.chain1, link.chain2, link.path, link.relayer
            );
        }

        Ok(())
    }

    /**
       The chains that the links of a relayer touch, each once, in the
       order they were added.
    */
    fn chains_of_relayer(&self, relayer_name: &str) -> Vec<&Chain> {
        let linked: HashSet<&str> = self
            .links
            .iter()
            .filter(|link| link.relayer == relayer_name)
            .flat_map(|link| [link.chain1.as_str(), link.chain2.as_str()])
            .collect();

        self.chains
            .iter()
            .filter(|chain| linked.contains(chain.chain_id()))
            .collect()
    }
}
