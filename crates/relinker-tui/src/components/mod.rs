pub mod help_overlay;
pub mod now_playing;
pub mod playlist_list;
pub mod track_list;
