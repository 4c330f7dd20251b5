pub mod frame_decoder;
