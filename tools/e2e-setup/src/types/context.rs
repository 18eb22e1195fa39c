/*!
   The test context that setup helpers run within.

   Rust's test harness has no notion of a per-test handle carrying a
   name, temporary directories and cleanup hooks. The [`TestContext`]
   trait makes those explicit so that they can be passed into the
   setup functions, and [`TestScope`] is the implementation used by
   actual tests.
*/

use core::cell::RefCell;
use std::fs;
use std::rc::Rc;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::docker::sanitize_name;
use crate::error::Error;

/**
   A deferred action registered with a [`TestContext`].
*/
pub type Cleanup = Box<dyn FnOnce()>;

/**
   A handle to the log of a test, which can be moved into cleanups that
   outlive the borrow of the [`TestContext`].
*/
#[derive(Clone)]
pub struct TestLogger {
    test_name: String,
    entries: Rc<RefCell<Vec<String>>>,
}

impl TestLogger {
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            entries: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn log(&self, message: &str) {
        info!("[{}] {}", self.test_name, message);
        self.entries.borrow_mut().push(message.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.borrow().clone()
    }
}

pub trait TestContext {
    /// The name of the running test.
    fn name(&self) -> &str;

    /**
       Create a fresh temporary directory, owned by the test.

       The directory is removed by a cleanup that is registered at the
       time of creation. Since cleanups run in reverse order of
       registration, anything registered afterwards is torn down while
       the directory still exists.
    */
    fn temp_dir(&self) -> Result<PathBuf, Error>;

    /**
       Register an action to be run once the test is over, whether it
       passed or not.
    */
    fn register_cleanup(&self, cleanup: Cleanup);

    fn logger(&self) -> TestLogger;

    /// Write a message to the test log.
    fn log(&self, message: &str) {
        self.logger().log(message)
    }
}

/**
   A [`TestContext`] that runs its cleanups when dropped.

   Dropping happens at the end of the test body, or during unwinding if
   the test panics, so cleanups run in both cases.
*/
pub struct TestScope {
    name: String,
    base_dir: Option<PathBuf>,
    cleanups: RefCell<Vec<Cleanup>>,
    logger: TestLogger,
}

impl TestScope {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();

        Self {
            logger: TestLogger::new(name.clone()),
            name,
            base_dir: None,
            cleanups: RefCell::new(Vec::new()),
        }
    }

    /**
       Create temporary directories under `base_dir` instead of the
       system temporary directory.
    */
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Messages written through [`TestContext::log`] so far.
    pub fn logs(&self) -> Vec<String> {
        self.logger.entries()
    }

    pub fn pending_cleanups(&self) -> usize {
        self.cleanups.borrow().len()
    }

    /**
       Run all registered cleanups now, most recently registered first.

       Each cleanup runs at most once. Cleanups registered while this is
       running are run as well.
    */
    pub fn run_cleanups(&self) {
        loop {
            let next = self.cleanups.borrow_mut().pop();

            match next {
                Some(cleanup) => cleanup(),
                None => break,
            }
        }
    }

    fn new_temp_dir(&self, base_dir: &Path) -> Result<PathBuf, Error> {
        let prefix = format!("{}-", sanitize_name(&self.name));

        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(base_dir)?;

        Ok(dir.into_path())
    }
}

impl TestContext for TestScope {
    fn name(&self) -> &str {
        &self.name
    }

    fn temp_dir(&self) -> Result<PathBuf, Error> {
        let base_dir = match &self.base_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                dir.clone()
            }
            None => std::env::temp_dir(),
        };

        let path = self.new_temp_dir(&base_dir)?;

        let removed = path.clone();
        self.register_cleanup(Box::new(move || {
            if let Err(e) = fs::remove_dir_all(&removed) {
                warn!("failed to remove temp dir {}: {}", removed.display(), e);
            }
        }));

        Ok(path)
    }

    fn register_cleanup(&self, cleanup: Cleanup) {
        self.cleanups.borrow_mut().push(cleanup);
    }

    fn logger(&self) -> TestLogger {
        self.logger.clone()
    }
}

impl Drop for TestScope {
    fn drop(&mut self) {
        self.run_cleanups();
    }
}
