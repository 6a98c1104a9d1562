// Stand-ins for the vessel hardware and the display, so the engine can run
// end to end on a desk.

pub mod dashboard;
pub mod kettle;
