use std::{any::type_name, fmt::Display};

pub fn pretty_type_name<T>() -> &'static str {
    type_name::<T>().rsplit("::").next().unwrap_or_default()
}

/// Log target handed to every component when it's constructed, so the
/// entrypoint decides where each component's records end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogTarget(&'static str);

impl LogTarget {
    pub const CHARM: LogTarget = LogTarget("router_charm::charm");
    pub const CLUSTER: LogTarget = LogTarget("router_charm::cluster");
    pub const WORKLOAD: LogTarget = LogTarget("router_charm::workload");

    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl Default for LogTarget {
    fn default() -> Self {
        Self::CHARM
    }
}

impl Display for LogTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

pub trait AndIf<F> {
    fn and_if(self, condition: bool, then: F) -> Self;
}

impl<T, F> AndIf<F> for T
where
    F: FnOnce(Self) -> Self,
{
    fn and_if(self, condition: bool, then: F) -> Self {
        let mut obj = self;
        if condition {
            obj = then(obj);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::apps::v1::StatefulSet;

    use super::{pretty_type_name, AndIf};

    #[test]
    fn pretty_type_name_strips_module_path() {
        assert_eq!(pretty_type_name::<StatefulSet>(), "StatefulSet");
    }

    #[test]
    fn and_if_applies_only_when_condition_holds() {
        let applied = vec![1].and_if(true, |mut v| {
            v.push(2);
            v
        });
        let skipped = vec![1].and_if(false, |mut v| {
            v.push(2);
            v
        });

        assert_eq!(applied, vec![1, 2]);
        assert_eq!(skipped, vec![1]);
    }
}
