//! Named builder lists.

use tracing::info;

use crate::builder::Builder;
use crate::error::Result;

/// An ordered list of builders run one after the other.
#[derive(Debug)]
pub struct Recipe {
    name: String,
    builders: Vec<Builder>,
}

impl Recipe {
    /// An empty recipe.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            builders: Vec::new(),
        }
    }

    /// Append a builder.
    pub fn with_builder(mut self, builder: Builder) -> Self {
        self.builders.push(builder);
        self
    }

    /// Recipe name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builders in run order.
    pub fn builders(&self) -> &[Builder] {
        &self.builders
    }

    /// Build every builder in order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing builder.
    pub fn build(&self) -> Result<()> {
        info!("recipe {}: building {} builders", self.name, self.builders.len());
        for builder in &self.builders {
            builder.build()?;
        }
        Ok(())
    }

    /// Run [`Builder::execute`] on every builder in order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing builder.
    pub fn execute(&mut self) -> Result<()> {
        for builder in &mut self.builders {
            builder.execute()?;
        }
        Ok(())
    }

    /// JSON description of every builder.
    pub fn dump(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "builders": self.builders.iter().map(Builder::dump).collect::<Vec<_>>(),
        })
    }
}
