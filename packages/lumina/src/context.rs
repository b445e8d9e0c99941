//! Caller-owned compilation context.
//!
//! A [`ShaderContext`] scopes everything pipelines share within one
//! rendering context: the binding registry that keeps identical constant
//! blocks on stable slots, and the constant uniform objects themselves, so
//! a block like the camera is backed by a single buffer no matter how many
//! pipelines declare it. Compilation is synchronous on the calling thread;
//! pipelines compiling against the same context must do so from one thread
//! or under a caller-supplied lock.

use crate::{
    blocks::{
        BindingRegistry,
        convert_constant_blocks,
    },
    uniform::UniformObject,
};
use std::collections::HashMap;
use anyhow::Result;


#[derive(Debug, Default)]
pub struct ShaderContext {
    pub(crate) registry: BindingRegistry,
    pub(crate) constants: HashMap<String, UniformObject>,
}

impl ShaderContext {
    pub fn new() -> Self {
        ShaderContext::default()
    }

    /// Pre-assigns binding slots for the constant blocks declared in
    /// `constant_code`, so shared blocks land on the same slots regardless
    /// of which pipeline compiles first.
    pub fn reserve_constant_bindings(&mut self, constant_code: &str) -> Result<()> {
        let mut code = constant_code.to_string();
        convert_constant_blocks(&mut code, &mut self.registry)?;
        Ok(())
    }

    /// Constant uniform shared by every pipeline of this context that
    /// declares it, or `None` while no pipeline has loaded it yet.
    pub fn shared_constant_mut(&mut self, name: &str) -> Option<&mut UniformObject> {
        self.constants.get_mut(name)
    }
}
