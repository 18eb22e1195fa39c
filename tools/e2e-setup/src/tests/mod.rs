/*!
   Scenario tests for the setup helpers, run against in-memory
   infrastructure and a fake `docker` command.
*/

mod docker_backend;
