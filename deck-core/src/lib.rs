pub mod error;

pub mod config;

pub mod controller {
    pub mod routing;
    pub use routing::{DispatchScope, HandlerMethod, Route, RoutingTable, RoutingTableBuilder};

    pub mod handlers;
    pub use handlers::{
        ActionEventHandler, EventContext, HandlerResult, NoopPlugin, PluginEventObserver,
        PluginHandler,
    };

    pub mod key_timing;
    pub use key_timing::{KeyGesture, KeyTiming, KeyTimingEngine};

    pub mod registry;
    pub use registry::{InstanceRegistry, RegisteredAction};

    pub mod sender;
    pub use sender::{Outgoing, Sender};

    pub mod supervisor;
    pub use supervisor::{SupervisorStats, TaskSupervisor};

    pub mod dispatcher;
    pub use dispatcher::Dispatcher;

    pub mod event_loop;
    pub use event_loop::{PluginBuilder, PluginRuntime, RunSummary};
}

pub mod model {
    pub mod settings;
    pub use settings::{GlobalSettings, SettingsCache};
}

pub mod protocol {
    pub mod inbound;
    pub use inbound::{EventPayload, InboundEvent, KeyEvent, PayloadKind, Settings};

    pub mod outbound;

    pub mod image;
    pub use image::{image_bytes_to_data_url, image_file_to_data_url};

    pub mod registration;
    pub use registration::{Info, Registration};
}

pub mod logging;
pub use logging::Logger;

pub use config::PluginConfig;

pub use error::{DeckError, DeckResult};
