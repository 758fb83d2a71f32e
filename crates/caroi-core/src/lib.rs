pub mod bleaching;
pub mod consts;
pub mod detection;
pub mod error;
pub mod fluctuation;
pub mod frame;
pub mod io;
pub mod roi;
pub mod session;
