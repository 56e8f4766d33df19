pub mod documentation;
pub mod health_service;
pub mod playlist_service;
pub mod room_service;
pub mod socket_service;
pub mod storage_supervisor;
