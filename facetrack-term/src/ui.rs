mod command_view;
mod session_view;
mod tracking_table_view;
mod tracking_view;

pub use command_view::CommandView;
pub use session_view::SessionView;
pub use tracking_table_view::TrackingTableView;
pub use tracking_view::TrackingView;
