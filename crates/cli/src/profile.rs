//! TOML run profiles.
//!
//! ```toml
//! scenarios = ["D01", "5m"]
//! events = ["Q100"]
//!
//! [variables]
//! CELL = "2.5"
//! ```
//!
//! Values given on the command line win over the profile, axis by axis.

use std::collections::BTreeMap;
use std::path::Path;

use hydroctl_eval::{Context, ResolveError};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Profile {
    pub scenarios: Vec<String>,
    pub events: Vec<String>,
    pub variables: BTreeMap<String, String>,
}

impl Profile {
    pub fn load(path: &Path) -> Result<Profile, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("error reading profile '{}': {}", path.display(), e))?;
        toml::from_str(&text).map_err(|e| format!("error parsing profile '{}': {}", path.display(), e))
    }
}

/// The run context from command-line arguments over an optional profile.
pub(crate) fn build_context(profile: Option<&Profile>, args: &[String]) -> Result<Context, ResolveError> {
    let from_args = Context::from_args(args)?;
    let Some(profile) = profile else {
        return Ok(from_args);
    };

    let scenarios = if from_args.scenario_names().is_empty() {
        profile.scenarios.clone()
    } else {
        from_args.scenario_names().to_vec()
    };
    let events = if from_args.event_names().is_empty() {
        profile.events.clone()
    } else {
        from_args.event_names().to_vec()
    };
    let mut ctx = Context::new(scenarios, events);
    for (name, value) in &profile.variables {
        ctx.set_variable(name, value.clone());
    }
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn command_line_wins_per_axis() {
        let profile: Profile = toml::from_str(
            "scenarios = [\"D01\"]\nevents = [\"Q010\"]\n[variables]\nCELL = \"5\"\n",
        )
        .unwrap();
        let ctx = build_context(Some(&profile), &args(&["-s1", "D02"])).unwrap();
        assert_eq!(ctx.scenario_names(), ["D02"]);
        assert_eq!(ctx.event_names(), ["Q010"]);
        assert_eq!(ctx.variables().get("cell"), Some("5"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Profile>("scenario = [\"D01\"]\n").is_err());
    }

    #[test]
    fn no_profile_is_just_the_arguments() {
        let ctx = build_context(None, &args(&["-e", "Q100"])).unwrap();
        assert_eq!(ctx.event_names(), ["Q100"]);
        assert!(ctx.scenario_names().is_empty());
    }
}
