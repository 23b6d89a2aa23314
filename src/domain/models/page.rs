use serde::{Deserialize, Serialize};

/// Offset pagination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub offset: u64,
    pub size: u32,
}

impl PageRequest {
    pub fn new(offset: u64, size: u32) -> Self {
        Self { offset, size }
    }

    pub fn first(size: u32) -> Self {
        Self { offset: 0, size }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { offset: 0, size: 20 }
    }
}

/// One page of results plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}
