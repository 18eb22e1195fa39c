/*!
   The container runtime that test chains and relayers run on, and the
   provisioning of an isolated network for each test.
*/

use itertools::Itertools;
use std::rc::Rc;
use tracing::{info, warn};

use crate::chain::config::DockerImage;
use crate::error::Error;
use crate::types::context::TestContext;
use crate::util::random::random_string;

pub mod engine;

pub use engine::DockerEngine;

/// Label attached to every container and network created for a test.
pub const TEST_NAME_LABEL: &str = "ibc-e2e-setup.test";

/**
   Identifier of the Docker network that all containers of a test join.
*/
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkId(pub String);

impl core::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/**
   A host directory mounted into a container.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bind {
    pub host_path: String,
    pub container_path: String,
}

impl Bind {
    pub fn new(host_path: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
        }
    }

    /// The bind in the `host:container` form of the Engine API.
    pub fn to_bind_string(&self) -> String {
        format!("{}:{}", self.host_path, self.container_path)
    }
}

/**
   Everything needed to create a container.
*/
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub network: Option<NetworkId>,
    pub hostname: Option<String>,
    pub binds: Vec<Bind>,
    pub exposed_ports: Vec<u16>,
    pub labels: Vec<(String, String)>,
    pub user: Option<String>,
    pub command: Vec<String>,
}

impl ContainerSpec {
    /// The command run by the container, for logging and reporting.
    pub fn command_line(&self) -> String {
        self.command.iter().join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/**
   The container operations that chains and relayers are built from.

   [`DockerEngine`] implements them against the Docker Engine API. Tests
   substitute an in-memory runtime to inspect what would be run.
*/
pub trait ContainerRuntime {
    /// Create a bridge network labelled with the test name.
    fn create_network(&self, name: &str, test_name: &str) -> Result<NetworkId, Error>;

    fn remove_network(&self, network: &NetworkId) -> Result<(), Error>;

    fn pull_image(&self, image: &DockerImage) -> Result<(), Error>;

    /**
       Run a one-shot container to completion, removing it afterwards,
       and return its output. A non-zero exit code is an error.
    */
    fn run_job(&self, spec: &ContainerSpec) -> Result<ExecOutput, Error>;

    /**
       Start a long-running container in the background and return its
       container ID.
    */
    fn run_detached(&self, spec: &ContainerSpec) -> Result<String, Error>;

    /// Run a command inside a running container.
    fn exec(&self, container: &str, command: &[String]) -> Result<ExecOutput, Error>;

    /// Force remove a container. Removing a missing container is not an error.
    fn remove_container(&self, container: &str) -> Result<(), Error>;

    /// Force remove every container carrying the label of the given test.
    fn remove_labelled_containers(&self, test_name: &str) -> Result<(), Error>;

    /**
       The host address that a container port is published on, in the
       form `host:port`, if it is published.
    */
    fn host_port(&self, container: &str, port: u16) -> Result<Option<String>, Error>;
}

/**
   Shared handle to the container runtime. Cloning it is cheap and all
   clones drive the same runtime.
*/
pub type DockerClient = Rc<dyn ContainerRuntime>;

/**
   Turn an arbitrary test name into something that is accepted as a
   Docker container or network name.
*/
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();

    sanitized.trim_start_matches(['-', '.', '_']).to_string()
}

/**
   Provisions the container runtime and an isolated network for a test.

   The network is given a unique name, and a cleanup is registered on
   the test context to remove every container labelled with the test
   name followed by the network itself.
*/
pub struct DockerSetup {
    pub docker: DockerClient,
}

impl DockerSetup {
    pub fn new(docker: DockerClient) -> Self {
        Self { docker }
    }

    pub fn setup(&self, test: &impl TestContext) -> Result<(DockerClient, NetworkId), Error> {
        let test_name = sanitize_name(test.name());
        let network_name = format!("ibc-e2e-{}", random_string());

        let network = self.docker.create_network(&network_name, &test_name)?;

        info!("created docker network {} for test {}", network, test.name());

        let docker = self.docker.clone();
        let cleanup_network = network.clone();

        test.register_cleanup(Box::new(move || {
            if let Err(e) = docker.remove_labelled_containers(&test_name) {
                warn!("failed to remove containers of test {}: {}", test_name, e);
            }

            if let Err(e) = docker.remove_network(&cleanup_network) {
                warn!("failed to remove network {}: {}", cleanup_network, e);
            }
        }));

        Ok((self.docker.clone(), network))
    }
}
