//! Channel id to officer role classification.

/// Env vars naming the officer channels, in classification order.
const CHANNEL_ENV_VARS: [(&str, &str); 7] = [
    ("commander", "CHANNEL_COMMANDER"),
    ("xo", "CHANNEL_XO"),
    ("intelligence", "CHANNEL_INTELLIGENCE"),
    ("operations", "CHANNEL_OPERATIONS"),
    ("logistics", "CHANNEL_LOGISTICS"),
    ("communications", "CHANNEL_COMMUNICATIONS"),
    ("general", "CHANNEL_GENERAL"),
];

/// Read-only mapping from officer role name to channel id, built once at
/// startup. Lookup goes the other way: channel id to role.
#[derive(Debug, Clone, Default)]
pub struct ChannelRouteTable {
    routes: Vec<(String, String)>,
}

impl ChannelRouteTable {
    /// Build the table from the `CHANNEL_*` env set. Unset vars are skipped.
    pub fn from_env() -> Self {
        let routes = CHANNEL_ENV_VARS
            .iter()
            .filter_map(|(role, var)| {
                let channel_id = std::env::var(var).ok()?;
                if channel_id.is_empty() {
                    return None;
                }
                Some((role.to_string(), channel_id))
            })
            .collect();

        Self { routes }
    }

    #[cfg(test)]
    fn from_routes(routes: Vec<(String, String)>) -> Self {
        Self { routes }
    }

    /// Classify a channel id. Returns the mapped role name, `"unknown"` for
    /// unmapped channels, or `"unrestricted"` when no channels are mapped at all.
    pub fn role_for(&self, channel_id: &str) -> &str {
        if self.routes.is_empty() {
            return "unrestricted";
        }

        self.routes
            .iter()
            .find(|(_, id)| id == channel_id)
            .map(|(role, _)| role.as_str())
            .unwrap_or("unknown")
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
