pub mod extrema;
