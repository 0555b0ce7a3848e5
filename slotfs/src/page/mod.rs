pub mod page_buffer;
