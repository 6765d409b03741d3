use grid_world_policy_iteration::{Config, Session};
use serde::Serialize;
use wasm_bindgen::prelude::*;

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsError> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsError::new(&e.to_string()))
}

/// The reference grid world and its solver, driven one discrete operation at a time by the
/// page. The page pulls `snapshot` after each operation to redraw.
#[wasm_bindgen]
pub struct GridWorldWrapper {
    session: Session,
}

#[wasm_bindgen]
impl GridWorldWrapper {
    #[wasm_bindgen(constructor)]
    pub fn new(seed: u64) -> Result<GridWorldWrapper, JsError> {
        console_error_panic_hook::set_once();
        let mut config = Config::default();
        config.solver.seed = seed;
        let session = Session::from_config(&config)?;
        Ok(Self { session })
    }

    pub fn width(&self) -> usize {
        self.session.world().width()
    }

    pub fn height(&self) -> usize {
        self.session.world().height()
    }

    pub fn policy_sweep(&mut self) -> Result<bool, JsError> {
        Ok(self.session.policy_sweep()?)
    }

    pub fn policy_improve(&mut self) -> Result<bool, JsError> {
        Ok(self.session.policy_improve()?)
    }

    pub fn run_to_convergence(&mut self) -> Result<JsValue, JsError> {
        to_js(&self.session.run_to_convergence()?)
    }

    pub fn step(&mut self) -> Result<JsValue, JsError> {
        to_js(&self.session.step()?)
    }

    pub fn reset(&mut self) {
        self.session.reset();
    }

    pub fn value(&self, x: usize, y: usize) -> Result<f64, JsError> {
        Ok(self.session.agent().value_function(x, y)?)
    }

    /// Probabilities of up, right, down and left.
    pub fn policy(&self, x: usize, y: usize) -> Result<Vec<f64>, JsError> {
        Ok(self.session.agent().policy(x, y)?.to_vec())
    }

    pub fn snapshot(&self) -> Result<JsValue, JsError> {
        to_js(&self.session.snapshot()?)
    }
}
