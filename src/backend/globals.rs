//! Global capability discovery and binding
//!
//! The compositor advertises its globals through `wl_registry`. We need one
//! each of the surface factory, shm allocator and xdg shell; the seat is
//! optional and only enables input.

use crate::error::{EngineError, Result};
use log::{debug, info, warn};
use wayland_client::globals::GlobalList;
use wayland_client::protocol::{wl_compositor::WlCompositor, wl_seat::WlSeat, wl_shm::WlShm};
use wayland_client::{Dispatch, QueueHandle};
use wayland_protocols::xdg::shell::client::xdg_wm_base::XdgWmBase;

/// A global the engine knows how to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Compositor,
    Shm,
    Shell,
    Seat,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Compositor,
        Capability::Shm,
        Capability::Shell,
        Capability::Seat,
    ];

    /// Wire interface name
    pub fn interface(self) -> &'static str {
        match self {
            Capability::Compositor => "wl_compositor",
            Capability::Shm => "wl_shm",
            Capability::Shell => "xdg_wm_base",
            Capability::Seat => "wl_seat",
        }
    }

    pub fn is_required(self) -> bool {
        !matches!(self, Capability::Seat)
    }

    pub fn from_interface(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cap| cap.interface() == name)
    }
}

/// Which capabilities a registry advertised
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Advertised {
    compositor: bool,
    shm: bool,
    shell: bool,
    seat: bool,
}

impl Advertised {
    pub fn from_interfaces<'a, I>(interfaces: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut advertised = Self::default();
        for name in interfaces {
            match Capability::from_interface(name) {
                Some(Capability::Compositor) => advertised.compositor = true,
                Some(Capability::Shm) => advertised.shm = true,
                Some(Capability::Shell) => advertised.shell = true,
                Some(Capability::Seat) => advertised.seat = true,
                None => {}
            }
        }
        advertised
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Compositor => self.compositor,
            Capability::Shm => self.shm,
            Capability::Shell => self.shell,
            Capability::Seat => self.seat,
        }
    }

    /// Fail with the first required capability that is absent
    pub fn check_required(&self) -> Result<()> {
        match Capability::ALL
            .into_iter()
            .find(|cap| cap.is_required() && !self.has(*cap))
        {
            Some(missing) => Err(EngineError::MissingCapability(missing.interface())),
            None => Ok(()),
        }
    }
}

/// Bound global proxies
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub compositor: WlCompositor,
    pub shm: WlShm,
    pub wm_base: XdgWmBase,
    pub seat: Option<WlSeat>,
}

impl Capabilities {
    /// Bind one instance of each capability from a completed registry roundtrip
    pub fn bind<D>(globals: &GlobalList, qh: &QueueHandle<D>) -> Result<Self>
    where
        D: Dispatch<WlCompositor, ()>
            + Dispatch<WlShm, ()>
            + Dispatch<XdgWmBase, ()>
            + Dispatch<WlSeat, ()>
            + 'static,
    {
        let list = globals.contents().clone_list();
        let advertised = Advertised::from_interfaces(list.iter().map(|g| g.interface.as_str()));
        debug!("Registry advertised {} globals: {:?}", list.len(), advertised);
        advertised.check_required()?;

        // wl_surface.damage_buffer needs version 4
        let compositor = globals
            .bind::<WlCompositor, _, _>(qh, 4..=5, ())
            .map_err(|_| EngineError::MissingCapability(Capability::Compositor.interface()))?;
        let shm = globals
            .bind::<WlShm, _, _>(qh, 1..=1, ())
            .map_err(|_| EngineError::MissingCapability(Capability::Shm.interface()))?;
        let wm_base = globals
            .bind::<XdgWmBase, _, _>(qh, 1..=2, ())
            .map_err(|_| EngineError::MissingCapability(Capability::Shell.interface()))?;

        let seat = match globals.bind::<WlSeat, _, _>(qh, 1..=7, ()) {
            Ok(seat) => Some(seat),
            Err(e) => {
                warn!("No usable wl_seat ({}); input callbacks will never fire", e);
                None
            }
        };

        info!(
            "Bound compositor, shm, xdg_wm_base{}",
            if seat.is_some() { " and seat" } else { "" }
        );

        Ok(Self {
            compositor,
            shm,
            wm_base,
            seat,
        })
    }
}
