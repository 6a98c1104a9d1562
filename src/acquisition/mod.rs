// Acquisition: periodic sensor sampling into the session history.
// Owns the growable sample buffer, the trailing display window and the
// task loop that feeds both.

pub mod acquisition_task;
pub mod sample_buffer;
pub mod sensor;
pub mod window;
