use std::borrow::Cow;

use thiserror::Error;

pub mod network_attachment;
pub mod statefulset;

#[derive(Debug, Error)]
pub enum ResourceViewError {
    #[error("Resource is missing required data ({})!", .0)]
    MissingData(Cow<'static, str>),
    #[error("Resource contains invalid data ({})!", .0)]
    InvalidData(Cow<'static, str>),
    #[error("Container index {index} is out of range, the pod template has {count} container(s)!")]
    ContainerIndexOutOfRange { index: usize, count: usize },
}
