//! Activation coordinates: cloud platform, profiles, and predicates.

use std::fmt;

use indexmap::IndexMap;

use crate::environment::Environment;
use crate::error::Error;
use crate::properties::Binder;

pub(crate) const CLOUD_PLATFORM_PROPERTY: &str = "spring.main.cloud-platform";
pub(crate) const ACTIVE_PROFILES_PROPERTY: &str = "spring.profiles.active";
pub(crate) const DEFAULT_PROFILES_PROPERTY: &str = "spring.profiles.default";
pub(crate) const INCLUDE_PROFILES_PROPERTY: &str = "spring.profiles.include";
pub(crate) const PROFILE_GROUPS_PREFIX: &str = "spring.profiles.group";

/// A cloud platform the process may be running on, inferred from connector
/// keys in the environment or enforced via `spring.main.cloud-platform`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudPlatform {
    None,
    CloudFoundry,
    Heroku,
    Sap,
    Kubernetes,
    AzureAppService,
}

impl CloudPlatform {
    pub fn parse(value: &str) -> Option<CloudPlatform> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Some(CloudPlatform::None),
            "cloud_foundry" => Some(CloudPlatform::CloudFoundry),
            "heroku" => Some(CloudPlatform::Heroku),
            "sap" => Some(CloudPlatform::Sap),
            "kubernetes" => Some(CloudPlatform::Kubernetes),
            "azure_app_service" => Some(CloudPlatform::AzureAppService),
            _ => None,
        }
    }

    fn detected(self, binder: &Binder) -> bool {
        match self {
            CloudPlatform::None => false,
            CloudPlatform::CloudFoundry => {
                binder.contains("VCAP_APPLICATION") || binder.contains("VCAP_SERVICES")
            }
            CloudPlatform::Heroku => binder.contains("DYNO"),
            CloudPlatform::Sap => binder.contains("HC_LANDSCAPE"),
            CloudPlatform::Kubernetes => {
                binder.contains("KUBERNETES_SERVICE_HOST")
                    && binder.contains("KUBERNETES_SERVICE_PORT")
            }
            CloudPlatform::AzureAppService => {
                binder.contains("WEBSITE_SITE_NAME") && binder.contains("WEBSITE_INSTANCE_ID")
            }
        }
    }

    /// The active platform: the enforced one when the property is set,
    /// otherwise the first platform whose connector keys are present.
    pub(crate) fn active(binder: &Binder) -> Result<Option<CloudPlatform>, Error> {
        if let Some(value) = binder.get(CLOUD_PLATFORM_PROPERTY)? {
            return match CloudPlatform::parse(&value) {
                Some(platform) => Ok(Some(platform)),
                None => Err(Error::InvalidProperty {
                    key: CLOUD_PLATFORM_PROPERTY.to_string(),
                    reason: format!("unknown cloud platform '{value}'"),
                }),
            };
        }
        const DETECTABLE: [CloudPlatform; 5] = [
            CloudPlatform::CloudFoundry,
            CloudPlatform::Heroku,
            CloudPlatform::Sap,
            CloudPlatform::Kubernetes,
            CloudPlatform::AzureAppService,
        ];
        Ok(DETECTABLE.into_iter().find(|p| p.detected(binder)))
    }
}

impl fmt::Display for CloudPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloudPlatform::None => "none",
            CloudPlatform::CloudFoundry => "cloud_foundry",
            CloudPlatform::Heroku => "heroku",
            CloudPlatform::Sap => "sap",
            CloudPlatform::Kubernetes => "kubernetes",
            CloudPlatform::AzureAppService => "azure_app_service",
        };
        f.write_str(name)
    }
}

/// The deduced profile state: active profiles (group-expanded) and default
/// profiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profiles {
    active: Vec<String>,
    default_profiles: Vec<String>,
}

impl Profiles {
    /// Deduces profiles from the binder (which already excludes
    /// profile-ignoring contributors), the environment's programmatic
    /// settings, and any additional profiles the host supplied.
    pub(crate) fn deduce(
        environment: &Environment,
        binder: &Binder,
        additional: &[String],
    ) -> Result<Profiles, Error> {
        let groups = group_lists(binder)?;

        let mut active = binder.get_list(ACTIVE_PROFILES_PROPERTY)?;
        if active.is_empty() {
            active = environment.active_profiles().to_vec();
        }
        for profile in additional {
            if !active.contains(profile) {
                active.push(profile.clone());
            }
        }

        let mut default_profiles = binder.get_list(DEFAULT_PROFILES_PROPERTY)?;
        if default_profiles.is_empty() {
            default_profiles = environment.default_profiles().to_vec();
        }

        Ok(Profiles {
            active: expand(active, &groups),
            default_profiles: expand(default_profiles, &groups),
        })
    }

    #[cfg(test)]
    pub(crate) fn of(active: &[&str], default_profiles: &[&str]) -> Profiles {
        Profiles {
            active: active.iter().map(|s| s.to_string()).collect(),
            default_profiles: default_profiles.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn active(&self) -> &[String] {
        &self.active
    }

    pub fn default_profiles(&self) -> &[String] {
        &self.default_profiles
    }

    /// The profiles resolution works against: the active ones, or the
    /// defaults when nothing is active.
    pub fn accepted(&self) -> &[String] {
        if self.active.is_empty() {
            &self.default_profiles
        } else {
            &self.active
        }
    }

    pub fn is_accepted(&self, profile: &str) -> bool {
        self.accepted().iter().any(|p| p == profile)
    }
}

fn group_lists(binder: &Binder) -> Result<IndexMap<String, Vec<String>>, Error> {
    let prefix = format!("{PROFILE_GROUPS_PREFIX}.");
    let mut groups = IndexMap::new();
    for key in binder.keys_with_prefix(&prefix) {
        let suffix = &key[prefix.len()..];
        let name = suffix.split(['[', '.']).next().unwrap_or(suffix).to_string();
        if name.is_empty() || groups.contains_key(&name) {
            continue;
        }
        let members = binder.get_list(&format!("{PROFILE_GROUPS_PREFIX}.{name}"))?;
        groups.insert(name, members);
    }
    Ok(groups)
}

/// Transitively expands profile groups, inserting each group's members
/// right after the group name.
fn expand(profiles: Vec<String>, groups: &IndexMap<String, Vec<String>>) -> Vec<String> {
    let mut expanded = Vec::new();
    for profile in profiles {
        push_expanded(&profile, groups, &mut expanded);
    }
    expanded
}

fn push_expanded(profile: &str, groups: &IndexMap<String, Vec<String>>, out: &mut Vec<String>) {
    if out.iter().any(|p| p == profile) {
        return;
    }
    out.push(profile.to_string());
    if let Some(members) = groups.get(profile) {
        for member in members {
            push_expanded(member, groups, out);
        }
    }
}

/// A boolean expression over profile names: `!`, `&`, `|`, parentheses.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileExpression {
    source: String,
    expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Name(String),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl ProfileExpression {
    pub fn parse(source: &str) -> Result<ProfileExpression, Error> {
        let mut parser = Parser {
            source,
            chars: source.char_indices().peekable(),
        };
        let expr = parser.parse_or()?;
        parser.skip_whitespace();
        if parser.chars.peek().is_some() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(ProfileExpression {
            source: source.to_string(),
            expr,
        })
    }

    pub fn matches(&self, accepted: &[String]) -> bool {
        self.expr.matches(accepted)
    }
}

impl fmt::Display for ProfileExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Expr {
    fn matches(&self, accepted: &[String]) -> bool {
        match self {
            Expr::Name(name) => accepted.iter().any(|p| p == name),
            Expr::Not(inner) => !inner.matches(accepted),
            Expr::And(parts) => parts.iter().all(|p| p.matches(accepted)),
            Expr::Or(parts) => parts.iter().any(|p| p.matches(accepted)),
        }
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: &str) -> Error {
        Error::InvalidProfileExpression {
            expression: self.source.to_string(),
            reason: reason.to_string(),
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some((_, ch)) if ch.is_whitespace()) {
            self.chars.next();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        if matches!(self.chars.peek(), Some((_, ch)) if *ch == expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr, Error> {
        let mut parts = vec![self.parse_and()?];
        while self.eat('|') {
            parts.push(self.parse_and()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::Or(parts)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, Error> {
        let mut parts = vec![self.parse_unary()?];
        while self.eat('&') {
            parts.push(self.parse_unary()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::And(parts)
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, Error> {
        if self.eat('!') {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        if self.eat('(') {
            let inner = self.parse_or()?;
            if !self.eat(')') {
                return Err(self.error("missing closing ')'"));
            }
            return Ok(inner);
        }
        self.parse_name()
    }

    fn parse_name(&mut self) -> Result<Expr, Error> {
        self.skip_whitespace();
        let mut name = String::new();
        while let Some((_, ch)) = self.chars.peek() {
            if ch.is_whitespace() || matches!(*ch, '!' | '&' | '|' | '(' | ')') {
                break;
            }
            name.push(*ch);
            self.chars.next();
        }
        if name.is_empty() {
            return Err(self.error("expected a profile name"));
        }
        Ok(Expr::Name(name))
    }
}

/// Activation predicate attached to a bound contributor.
#[derive(Debug, Clone, Default)]
pub struct Activation {
    on_cloud_platform: Option<CloudPlatform>,
    on_profile: Vec<ProfileExpression>,
}

impl Activation {
    pub fn new(
        on_cloud_platform: Option<CloudPlatform>,
        on_profile: Vec<ProfileExpression>,
    ) -> Activation {
        Activation {
            on_cloud_platform,
            on_profile,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.on_cloud_platform.is_none() && self.on_profile.is_empty()
    }

    /// A predicate cannot evaluate without a context; until one exists the
    /// contributor stays inactive.
    pub fn is_active(&self, context: Option<&ActivationContext>) -> bool {
        let Some(context) = context else {
            return false;
        };
        if let Some(platform) = self.on_cloud_platform {
            if context.cloud_platform() != Some(platform) {
                return false;
            }
        }
        if !self.on_profile.is_empty() {
            let Some(profiles) = context.profiles() else {
                return false;
            };
            if !self.on_profile.iter().any(|e| e.matches(profiles.accepted())) {
                return false;
            }
        }
        true
    }
}

/// The coordinates contributors are activated against, built in three
/// stages: absent, platform-only, platform plus profiles.
#[derive(Debug, Clone, Default)]
pub struct ActivationContext {
    cloud_platform: Option<CloudPlatform>,
    profiles: Option<Profiles>,
}

impl ActivationContext {
    pub fn new(cloud_platform: Option<CloudPlatform>) -> ActivationContext {
        ActivationContext {
            cloud_platform,
            profiles: None,
        }
    }

    #[must_use]
    pub fn with_profiles(mut self, profiles: Profiles) -> ActivationContext {
        self.profiles = Some(profiles);
        self
    }

    pub fn cloud_platform(&self) -> Option<CloudPlatform> {
        self.cloud_platform
    }

    pub fn profiles(&self) -> Option<&Profiles> {
        self.profiles.as_ref()
    }
}

impl fmt::Display for ActivationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActivationContext(platform: ")?;
        match self.cloud_platform {
            Some(platform) => write!(f, "{platform}")?,
            None => f.write_str("-")?,
        }
        match &self.profiles {
            Some(profiles) => write!(f, ", profiles: {:?})", profiles.active()),
            None => f.write_str(", profiles: -)"),
        }
    }
}
