//! Test harness for isolated engine testing.

use std::sync::Arc;
use std::time::Duration;
use stormstack_core::{ContainerId, EngineConfig, MatchId, PlayerId, Result};
use stormstack_engine::Container;
use stormstack_game_modules::{EntityModule, GridMapModule};

/// A container with the built-in modules enabled and one running match.
pub struct EngineHarness {
    /// The container under test.
    pub container: Container,
    /// The running match.
    pub match_id: MatchId,
}

impl EngineHarness {
    /// Build the harness: container started, match created and running.
    ///
    /// # Panics
    ///
    /// Panics on setup failure; harness construction is test-only.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let container = Container::new(
            ContainerId(1),
            vec![Arc::new(EntityModule::new()), Arc::new(GridMapModule::new())],
            &EngineConfig::default(),
            Some(Duration::from_millis(10)),
        )
        .expect("harness container");
        container.start().expect("start container");
        let match_id = container.create_match(None, 8).expect("create match");
        container.start_match(match_id).expect("start match");
        Self {
            container,
            match_id,
        }
    }

    /// Submit a command to the harness match.
    ///
    /// # Errors
    ///
    /// Propagates submission failures.
    pub fn submit(
        &self,
        player: PlayerId,
        command: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        self.container
            .submit_command(self.match_id, player, command, &payload)
    }

    /// Run one tick and return the match's new tick number.
    ///
    /// # Errors
    ///
    /// Propagates tick failures.
    pub fn tick(&self) -> Result<u64> {
        self.container.tick()?;
        Ok(self.container.match_info(self.match_id)?.current_tick)
    }
}

impl Default for EngineHarness {
    fn default() -> Self {
        Self::new()
    }
}
