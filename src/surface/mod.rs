mod presence;
mod runtime;
mod state;

pub use presence::WidgetPresence;
pub use runtime::Surface;
pub use state::{
    Command, Provisional, Screen, SurfaceAction, SurfaceKind, SurfaceState, SurfaceView,
};
