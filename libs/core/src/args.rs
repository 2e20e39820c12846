use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Arguments handed to a registered method.
///
/// Parameters are looked up by position first and by keyword second, the way
/// a caller may pass `add(1, b=2)`. Keyword names are not checked against any
/// signature; a method only sees the names it asks for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    positional: Vec<Value>,
    keyword: Map<String, Value>,
}

impl Args {
    pub fn new(positional: Vec<Value>, keyword: Map<String, Value>) -> Self {
        Self {
            positional,
            keyword,
        }
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn keyword(&self) -> &Map<String, Value> {
        &self.keyword
    }

    /// Total number of supplied arguments
    pub fn len(&self) -> usize {
        self.positional.len() + self.keyword.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Required parameter at `index`, or passed as `name`
    pub fn get<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<T> {
        self.get_opt(index, name)?
            .ok_or_else(|| Error::dispatch(format!("missing required argument '{name}'")))
    }

    /// Optional parameter at `index`, or passed as `name`
    pub fn get_opt<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<Option<T>> {
        let raw = match (self.positional.get(index), self.keyword.get(name)) {
            (Some(_), Some(_)) => {
                return Err(Error::dispatch(format!(
                    "got multiple values for argument '{name}'"
                )))
            }
            (Some(v), None) | (None, Some(v)) => v,
            (None, None) => return Ok(None),
        };

        T::deserialize(raw)
            .map(Some)
            .map_err(|e| Error::dispatch(format!("argument '{name}': {e}")))
    }

    /// Fail when more than `max` positional arguments were supplied
    pub fn at_most(&self, max: usize) -> Result<&Self> {
        if self.positional.len() > max {
            return Err(Error::dispatch(format!(
                "takes {max} positional arguments but {} were given",
                self.positional.len()
            )));
        }
        Ok(self)
    }

    /// Fail on keyword arguments outside `allowed`
    pub fn only_keywords(&self, allowed: &[&str]) -> Result<&Self> {
        if let Some(unexpected) = self.keyword.keys().find(|k| !allowed.contains(&k.as_str())) {
            return Err(Error::dispatch(format!(
                "got an unexpected keyword argument '{unexpected}'"
            )));
        }
        Ok(self)
    }
}
