//! Icomera captive portals.
//!
//! These portals expose no journey or position data, only a login page. The
//! vehicle therefore runs on a [`DummyConnector`] and offers internet access
//! control alone.

use crate::capability::{AccessState, InternetAccess};
use crate::config::VehicleConfig;
use crate::train::Train;
use crate::vehicle::{Facade, Vehicle};
use crate::{Error, Result};
use onboard_connect::dummy::DummyConnector;
use onboard_connect::rest::RestSession;
use onboard_connect::{Connector, SessionConfig};

pub const API_URL: &str = "http://omboard.info";
pub const METRONOM_URL: &str = "http://wifi.metronom.de";

const ONLINE: &str = "user-online";
const OFFLINE: &str = "user-offline";

/// Whether any element in `html` carries `class`.
pub fn has_class(html: &str, class: &str) -> bool {
    html.match_indices("class=").any(|(at, attr)| {
        let value = &html[at + attr.len()..];
        let quote = match value.chars().next() {
            Some(quote @ ('"' | '\'')) => quote,
            _ => return false,
        };
        value[1..]
            .split(quote)
            .next()
            .map_or(false, |classes| classes.split_ascii_whitespace().any(|c| c == class))
    })
}

/// The `csrf` cookie among `Set-Cookie` header values.
pub fn csrf_token<'a>(set_cookies: impl IntoIterator<Item = &'a str>) -> Option<String> {
    set_cookies.into_iter().find_map(|header| {
        let pair = header.split(';').next()?;
        let (name, value) = pair.split_once('=')?;
        (name.trim() == "csrf").then(|| value.trim().to_string())
    })
}

#[derive(Debug, Clone, Copy)]
enum Switch {
    Login,
    Logout,
}

impl Switch {
    fn field(self) -> &'static str {
        match self {
            Switch::Login => "login",
            Switch::Logout => "logout",
        }
    }

    /// Page class before and after the switch
    fn classes(self) -> (&'static str, &'static str) {
        match self {
            Switch::Login => (OFFLINE, ONLINE),
            Switch::Logout => (ONLINE, OFFLINE),
        }
    }
}

/// Logs in and out by submitting the portal's form.
pub struct PortalAccess {
    session: RestSession,
    state: AccessState,
}

impl PortalAccess {
    pub fn new(session: RestSession) -> Self {
        Self {
            session,
            state: AccessState::default(),
        }
    }

    fn switch(&self, switch: Switch) -> Result<()> {
        let (before, after) = switch.classes();
        let response = self.session.get("de")?;
        let csrf = csrf_token(
            response
                .headers()
                .get_all("set-cookie")
                .iter()
                .filter_map(|value| value.to_str().ok()),
        );
        let page = response.text()?;
        if !has_class(&page, before) {
            log::debug!("Portal already shows {}", after);
            return Ok(());
        }

        let csrf = csrf.ok_or_else(|| Error::Connection("portal sent no csrf cookie".to_string()))?;
        let page = self
            .session
            .post_form("de/", &[(switch.field(), "true"), ("CSRFToken", csrf.as_str())])?
            .text()?;
        if !has_class(&page, after) {
            return Err(Error::Connection(format!("{} failed", switch.field())));
        }
        Ok(())
    }
}

impl InternetAccess for PortalAccess {
    fn enable(&self) -> Result<()> {
        self.state.toggle(true, || self.switch(Switch::Login))
    }

    fn disable(&self) -> Result<()> {
        self.state.toggle(false, || self.switch(Switch::Logout))
    }

    fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }
}

pub struct IcomeraTrain {
    facade: Facade<DummyConnector>,
    access: PortalAccess,
}

impl IcomeraTrain {
    pub fn new() -> Result<Self> {
        Self::with_config(VehicleConfig::default())
    }

    /// The metronom portal, an Icomera installation under its own domain.
    pub fn metronom() -> Result<Self> {
        Self::with_config(VehicleConfig {
            session: SessionConfig::new(METRONOM_URL),
            ..VehicleConfig::default()
        })
    }

    pub fn with_config(config: VehicleConfig) -> Result<Self> {
        let session = RestSession::new(&config.session.or_base_url(API_URL))?;
        let portal = session.base_url().as_str().trim_end_matches('/').to_string();
        Ok(Self {
            facade: Facade::blocking(DummyConnector::with_url(portal)),
            access: PortalAccess::new(session),
        })
    }
}

impl Vehicle for IcomeraTrain {
    fn init(&self) -> Result<()> {
        self.facade.init()
    }

    fn shutdown(&self) {
        self.facade.shutdown()
    }

    /// Portals report no vehicle id, so the portal stands in for one.
    fn id(&self) -> Result<String> {
        Ok(self.facade.connector()?.api_url().to_string())
    }

    fn internet_access(&self) -> Result<&dyn InternetAccess> {
        Ok(self)
    }
}

impl Train for IcomeraTrain {}

impl InternetAccess for IcomeraTrain {
    fn enable(&self) -> Result<()> {
        self.facade.connector()?;
        self.access.enable()
    }

    fn disable(&self) -> Result<()> {
        self.facade.connector()?;
        self.access.disable()
    }

    fn is_enabled(&self) -> bool {
        self.access.is_enabled()
    }
}
