pub mod chat_loop;
