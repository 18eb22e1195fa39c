/*!
   [`ContainerRuntime`] implemented against the Docker Engine API using
   `bollard`.

   The setup helpers are synchronous, so every call is driven to
   completion on a Tokio runtime owned by the engine.
*/

use std::collections::HashMap;
use std::sync::Arc;

use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, WaitContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use bollard::network::CreateNetworkOptions;
use bollard::Docker;
use eyre::eyre;
use futures::StreamExt;
use tokio::runtime::Runtime as TokioRuntime;
use tracing::{debug, info, warn};

use crate::chain::config::DockerImage;
use crate::docker::{ContainerRuntime, ContainerSpec, ExecOutput, NetworkId, TEST_NAME_LABEL};
use crate::error::Error;

pub struct DockerEngine {
    client: Docker,
    rt: Arc<TokioRuntime>,
}

impl DockerEngine {
    /**
       Connect to the local Docker daemon, honouring `DOCKER_HOST`.
    */
    pub fn connect() -> Result<Self, Error> {
        let client = Docker::connect_with_local_defaults()?;
        let rt = Arc::new(TokioRuntime::new()?);

        Ok(Self::new(client, rt))
    }

    pub fn new(client: Docker, rt: Arc<TokioRuntime>) -> Self {
        Self { client, rt }
    }

    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<String, Error> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .client
            .create_container(Some(options), container_config(spec))
            .await?;

        self.client
            .start_container::<String>(&spec.name, None)
            .await?;

        Ok(response.id)
    }

    async fn wait_exit_code(&self, container: &str) -> Result<i64, Error> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.client.wait_container(container, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit status as an error
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e.into()),
            None => Err(eyre!("wait stream of container {} ended unexpectedly", container).into()),
        }
    }

    async fn collect_logs(&self, container: &str) -> Result<ExecOutput, Error> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut stream = self.client.logs(container, Some(options));
        let mut output = ExecOutput::default();

        while let Some(chunk) = stream.next().await {
            append_output(&mut output, chunk?);
        }

        Ok(output)
    }

    async fn force_remove(&self, container: &str) -> Result<(), Error> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        match self.client.remove_container(container, Some(options)).await {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn run_job_async(&self, spec: &ContainerSpec) -> Result<ExecOutput, Error> {
        self.create_and_start(spec).await?;

        let exit_code = self.wait_exit_code(&spec.name).await;
        let output = self.collect_logs(&spec.name).await;

        if let Err(e) = self.force_remove(&spec.name).await {
            warn!("failed to remove job container {}: {}", spec.name, e);
        }

        let exit_code = exit_code?;
        let output = output?;

        debug!(
            "job {} `{}` exited with {}",
            spec.name,
            spec.command_line(),
            exit_code
        );

        check_exit_code(
            format!("{} (job {})", spec.command_line(), spec.name),
            exit_code,
            output,
        )
    }

    async fn exec_async(&self, container: &str, command: &[String]) -> Result<ExecOutput, Error> {
        let options = CreateExecOptions {
            cmd: Some(command.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self.client.create_exec(container, options).await?;

        let mut output = ExecOutput::default();

        if let StartExecResults::Attached { output: mut stream, .. } =
            self.client.start_exec(&exec.id, None).await?
        {
            while let Some(chunk) = stream.next().await {
                append_output(&mut output, chunk?);
            }
        }

        let inspect = self.client.inspect_exec(&exec.id).await?;

        check_exit_code(
            format!("{} (exec in {})", command.join(" "), container),
            inspect.exit_code.unwrap_or(-1),
            output,
        )
    }
}

impl ContainerRuntime for DockerEngine {
    fn create_network(&self, name: &str, test_name: &str) -> Result<NetworkId, Error> {
        let options = CreateNetworkOptions {
            name: name.to_string(),
            driver: "bridge".to_string(),
            labels: HashMap::from([(TEST_NAME_LABEL.to_string(), test_name.to_string())]),
            ..Default::default()
        };

        self.rt.block_on(self.client.create_network(options))?;

        Ok(NetworkId(name.to_string()))
    }

    fn remove_network(&self, network: &NetworkId) -> Result<(), Error> {
        self.rt.block_on(self.client.remove_network(&network.0))?;

        Ok(())
    }

    fn pull_image(&self, image: &DockerImage) -> Result<(), Error> {
        self.rt.block_on(async {
            let options = CreateImageOptions {
                from_image: image.repository.clone(),
                tag: image.version.clone(),
                ..Default::default()
            };

            let mut stream = self.client.create_image(Some(options), None, None);

            while let Some(progress) = stream.next().await {
                progress?;
            }

            info!("pulled image {}", image);

            Ok(())
        })
    }

    fn run_job(&self, spec: &ContainerSpec) -> Result<ExecOutput, Error> {
        self.rt.block_on(self.run_job_async(spec))
    }

    fn run_detached(&self, spec: &ContainerSpec) -> Result<String, Error> {
        let id = self.rt.block_on(self.create_and_start(spec))?;

        info!("started container {} with id {}", spec.name, id);

        Ok(id)
    }

    fn exec(&self, container: &str, command: &[String]) -> Result<ExecOutput, Error> {
        self.rt.block_on(self.exec_async(container, command))
    }

    fn remove_container(&self, container: &str) -> Result<(), Error> {
        self.rt.block_on(self.force_remove(container))?;

        debug!("removed container {}", container);

        Ok(())
    }

    fn remove_labelled_containers(&self, test_name: &str) -> Result<(), Error> {
        self.rt.block_on(async {
            let options = ListContainersOptions::<String> {
                all: true,
                filters: HashMap::from([(
                    "label".to_string(),
                    vec![format!("{TEST_NAME_LABEL}={test_name}")],
                )]),
                ..Default::default()
            };

            let containers = self.client.list_containers(Some(options)).await?;

            for id in containers.into_iter().filter_map(|container| container.id) {
                self.force_remove(&id).await?;
            }

            Ok(())
        })
    }

    fn host_port(&self, container: &str, port: u16) -> Result<Option<String>, Error> {
        let inspect = self.rt.block_on(
            self.client
                .inspect_container(container, None::<InspectContainerOptions>),
        )?;

        let address = inspect
            .network_settings
            .and_then(|settings| settings.ports)
            .and_then(|mut ports| ports.remove(&format!("{port}/tcp")))
            .flatten()
            .and_then(|bindings| bindings.iter().find_map(published_address));

        Ok(address)
    }
}

/**
   Translate a [`ContainerSpec`] into the Engine API's container config.
   Exposed ports are published on an ephemeral host port.
*/
pub fn container_config(spec: &ContainerSpec) -> Config<String> {
    let port_keys: Vec<String> = spec
        .exposed_ports
        .iter()
        .map(|port| format!("{port}/tcp"))
        .collect();

    let exposed_ports: HashMap<String, HashMap<(), ()>> = port_keys
        .iter()
        .map(|key| (key.clone(), HashMap::new()))
        .collect();

    let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = port_keys
        .iter()
        .map(|key| {
            (
                key.clone(),
                Some(vec![PortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some(String::new()),
                }]),
            )
        })
        .collect();

    let host_config = HostConfig {
        binds: Some(spec.binds.iter().map(|bind| bind.to_bind_string()).collect()),
        network_mode: spec.network.as_ref().map(|network| network.0.clone()),
        port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        cmd: Some(spec.command.clone()),
        hostname: spec.hostname.clone(),
        user: spec.user.clone(),
        labels: Some(spec.labels.iter().cloned().collect()),
        exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
        host_config: Some(host_config),
        ..Default::default()
    }
}

/**
   The host-reachable address of a port binding. Bindings on all
   interfaces are reached through the loopback address.
*/
pub fn published_address(binding: &PortBinding) -> Option<String> {
    let port = binding.host_port.as_deref().filter(|port| !port.is_empty())?;

    let host = match binding.host_ip.as_deref() {
        None | Some("") | Some("0.0.0.0") | Some("::") => "127.0.0.1",
        Some(host) => host,
    };

    Some(format!("{host}:{port}"))
}

fn append_output(output: &mut ExecOutput, chunk: LogOutput) {
    match chunk {
        LogOutput::StdErr { message } => output.stderr.push_str(&String::from_utf8_lossy(&message)),
        LogOutput::StdOut { message } | LogOutput::Console { message } => {
            output.stdout.push_str(&String::from_utf8_lossy(&message))
        }
        LogOutput::StdIn { .. } => {}
    }
}

fn check_exit_code(command: String, exit_code: i64, output: ExecOutput) -> Result<ExecOutput, Error> {
    if exit_code == 0 {
        Ok(output)
    } else {
        Err(Error::command_failed(
            command,
            i32::try_from(exit_code).ok(),
            output.stderr,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::Bind;

    #[test]
    fn translates_container_spec() {
        let spec = ContainerSpec {
            name: "t-chain-a-fn-0".to_string(),
            image: "simd:latest".to_string(),
            network: Some(NetworkId("net".to_string())),
            hostname: Some("t-chain-a-fn-0".to_string()),
            binds: vec![Bind::new("/tmp/home", "/var/cosmos-chain/simapp-a")],
            exposed_ports: vec![26657],
            labels: vec![(TEST_NAME_LABEL.to_string(), "t".to_string())],
            user: None,
            command: vec!["simd".to_string(), "start".to_string()],
        };

        let config = container_config(&spec);
        let host_config = config.host_config.clone().unwrap();

        assert_eq!(config.image.as_deref(), Some("simd:latest"));
        assert_eq!(config.cmd, Some(vec!["simd".to_string(), "start".to_string()]));
        assert_eq!(config.hostname.as_deref(), Some("t-chain-a-fn-0"));
        assert_eq!(
            config.labels.unwrap().get(TEST_NAME_LABEL).map(String::as_str),
            Some("t")
        );
        assert!(config.exposed_ports.unwrap().contains_key("26657/tcp"));

        assert_eq!(host_config.network_mode.as_deref(), Some("net"));
        assert_eq!(
            host_config.binds,
            Some(vec!["/tmp/home:/var/cosmos-chain/simapp-a".to_string()])
        );
        assert!(host_config.port_bindings.unwrap().contains_key("26657/tcp"));
    }

    #[test]
    fn jobs_publish_no_ports() {
        let spec = ContainerSpec {
            name: "job".to_string(),
            image: "simd:latest".to_string(),
            command: vec!["simd".to_string(), "init".to_string()],
            ..ContainerSpec::default()
        };

        let config = container_config(&spec);

        assert!(config.exposed_ports.is_none());
        assert!(config.host_config.unwrap().port_bindings.is_none());
    }

    #[test]
    fn published_address_uses_loopback_for_wildcard() {
        let binding = |ip: Option<&str>, port: Option<&str>| PortBinding {
            host_ip: ip.map(str::to_string),
            host_port: port.map(str::to_string),
        };

        assert_eq!(
            published_address(&binding(Some("0.0.0.0"), Some("49153"))).as_deref(),
            Some("127.0.0.1:49153")
        );
        assert_eq!(
            published_address(&binding(Some("10.0.0.2"), Some("49153"))).as_deref(),
            Some("10.0.0.2:49153")
        );
        assert_eq!(published_address(&binding(None, Some(""))), None);
        assert_eq!(published_address(&binding(Some("0.0.0.0"), None)), None);
    }

    #[test]
    fn non_zero_exit_code_is_an_error() {
        let output = ExecOutput {
            stdout: String::new(),
            stderr: "boom".to_string(),
        };

        assert!(check_exit_code("simd init".to_string(), 0, output.clone()).is_ok());

        let e = check_exit_code("simd init".to_string(), 1, output).unwrap_err();
        assert!(e.to_string().contains("simd init"));
        assert!(e.to_string().contains("boom"));
    }
}
