use fail::FailScenario;

/// Activates fail points for the lifetime of the guard.
///
/// Every configured fail point is switched off again when the guard is dropped, so tests
/// sharing a process do not observe each other's actions.
pub struct FailPointGuard<'a> {
    _scenario: FailScenario<'a>,
    names: Vec<String>,
}

impl<'a> FailPointGuard<'a> {
    /// Configures each `(name, action)` pair, e.g. `("queue.check_in", "return(store)")`.
    pub fn activate(actions: &[(&str, &str)]) -> FailPointGuard<'a> {
        let scenario = FailScenario::setup();

        let mut names = Vec::with_capacity(actions.len());
        for (name, action) in actions {
            fail::cfg(*name, action).unwrap();
            names.push(name.to_string());
        }

        Self {
            _scenario: scenario,
            names,
        }
    }
}

impl Drop for FailPointGuard<'_> {
    fn drop(&mut self) {
        for name in &self.names {
            fail::remove(name);
        }
    }
}
