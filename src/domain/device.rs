use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::domain::error::TaskError;

/// Where the model lives and runs.
///
/// Accepted spellings: `cpu`, `gpu`, `gpu:N`, `cuda`, `cuda:N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    #[default]
    Cpu,
    Gpu(usize),
}

impl Device {
    pub fn is_gpu(&self) -> bool {
        matches!(self, Device::Gpu(_))
    }
}

impl FromStr for Device {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s == "cpu" {
            return Ok(Device::Cpu);
        }
        let (prefix, index) = match s.split_once(':') {
            Some((prefix, index)) => (prefix, Some(index)),
            None                  => (s.as_str(), None),
        };
        if prefix != "gpu" && prefix != "cuda" {
            return Err(TaskError::InvalidConfig(format!("unknown device '{s}'")));
        }
        let index = match index {
            Some(i) => i
                .parse::<usize>()
                .map_err(|_| TaskError::InvalidConfig(format!("bad device index in '{s}'")))?,
            None => 0,
        };
        Ok(Device::Gpu(index))
    }
}

impl TryFrom<String> for Device {
    type Error = TaskError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu    => f.write_str("cpu"),
            Device::Gpu(i) => write!(f, "gpu:{i}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spellings() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("CUDA".parse::<Device>().unwrap(), Device::Gpu(0));
        assert_eq!("cuda:1".parse::<Device>().unwrap(), Device::Gpu(1));
        assert_eq!("gpu:3".parse::<Device>().unwrap(), Device::Gpu(3));
    }

    #[test]
    fn test_rejects_unknown_device() {
        assert!("tpu".parse::<Device>().is_err());
        assert!("gpu:x".parse::<Device>().is_err());
    }

    #[test]
    fn test_serde_uses_string_form() {
        let json = serde_json::to_string(&Device::Gpu(2)).unwrap();
        assert_eq!(json, "\"gpu:2\"");
        let back: Device = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Device::Gpu(2));
    }
}
