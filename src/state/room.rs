//! The state machine of a single room: membership, host handover, rounds,
//! scoring, and the buzzer queue.
//!
//! Every operation here is a pure synchronous mutation returning the events
//! to broadcast; the service layer owns locking, IO, and persistence. That
//! split keeps the tricky rules (dual-identity membership, buzzer FIFO,
//! skip-vote majority) unit-testable without a runtime.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use rand::Rng;

use crate::{
    dto::room::{
        Answer, BuzzedDto, BuzzerDto, ChatDto, CurrentRoundDto, GameOverDto, GameStartedDto,
        GameType, Hint, KickedDto, PlayMode, PlayerDto, Playback, QueueEntryDto, QueueUpdatedDto,
        RoomStateDto, RoundEndDto, RoundStartDto, ScoreDto, TrackInfo, VerifyResultDto,
    },
    dto::ws::ServerMessage,
    error::ServiceError,
    matching,
};

/// Display names are trimmed to this many code points.
pub const MAX_NAME_LEN: usize = 32;
/// Chat messages are trimmed to this many code points.
pub const MAX_CHAT_LEN: usize = 500;
/// Points for identifying both title and artist.
const FULL_POINTS: u32 = 10;
/// Points for identifying the title alone.
const TITLE_POINTS: u32 = 5;
/// Default amount for host-driven score adjustments.
pub const DEFAULT_ADJUST_POINTS: u32 = 10;
/// Prefix of sentinel connection handles used for snapshot-restored members.
pub const PENDING_PREFIX: &str = "pending-";

/// Who a message is delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    All,
    One(String),
}

/// One engine-produced event with its audience.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub to: Audience,
    pub message: ServerMessage,
}

impl RoomEvent {
    pub fn all(message: ServerMessage) -> Self {
        Self {
            to: Audience::All,
            message,
        }
    }

    pub fn one(conn: impl Into<String>, message: ServerMessage) -> Self {
        Self {
            to: Audience::One(conn.into()),
            message,
        }
    }
}

/// Leaderboard mirror instruction produced alongside a score change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardDelta {
    pub user_id: String,
    pub name: String,
    pub delta: i64,
}

/// One member of a room.
#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
    pub score: u32,
    pub user_id: Option<String>,
    pub avatar: Option<String>,
}

/// One queued buzzer behind the current holder.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub conn: String,
    pub name: String,
    pub at: u64,
}

/// First-come-first-served arbitration state, present only after the first
/// buzz of a round.
#[derive(Debug, Clone)]
pub struct Buzzer {
    pub first_buzz_at: u64,
    pub holder: String,
    pub holder_name: String,
    pub queue: VecDeque<QueueEntry>,
}

impl Buzzer {
    fn contains(&self, conn: &str) -> bool {
        self.holder == conn || self.queue.iter().any(|entry| entry.conn == conn)
    }

    fn queue_dto(&self) -> Vec<QueueEntryDto> {
        self.queue
            .iter()
            .map(|entry| QueueEntryDto {
                id: entry.conn.clone(),
                name: entry.name.clone(),
                at: entry.at,
            })
            .collect()
    }
}

/// One playback of a single track with arbitration state.
#[derive(Debug, Clone)]
pub struct Round {
    pub started_at: u64,
    pub track: TrackInfo,
    pub playback: Playback,
    pub answer: Answer,
    pub solved: bool,
    pub paused: bool,
    pub hint: Hint,
    pub buzzer: Option<Buzzer>,
}

/// What the service should do after planning the next round.
#[derive(Debug, Clone)]
pub enum NextRoundPlan {
    /// Resolve playback for tracks starting at `start_index`, then commit.
    Resolve {
        start_index: usize,
        tracks: Vec<TrackInfo>,
        mode: PlayMode,
    },
    /// The pool is exhausted; the game is over.
    Exhausted,
}

/// Authoritative state of one room. Owned exclusively by the registry slot;
/// all access is serialized by the per-room lock.
#[derive(Debug, Clone)]
pub struct Room {
    pub code: String,
    pub host_conn: String,
    pub host_user: Option<String>,
    pub members: IndexMap<String, Member>,
    pub mode: PlayMode,
    pub game_type: GameType,
    pub tracks: Vec<TrackInfo>,
    pub round_index: usize,
    pub round_limit: Option<usize>,
    pub current_round: Option<Round>,
    pub skip_votes: HashSet<String>,
    pub answers_known: bool,
    /// Mutation counter; doubles as the snapshot sequence number.
    pub version: u64,
}

impl Room {
    /// Fresh room created on behalf of `creator_conn`, who holds host rights
    /// until a verified identity is adopted.
    pub fn new(code: String, creator_conn: String) -> Self {
        Self {
            code,
            host_conn: creator_conn,
            host_user: None,
            members: IndexMap::new(),
            mode: PlayMode::default(),
            game_type: GameType::default(),
            tracks: Vec::new(),
            round_index: 0,
            round_limit: None,
            current_round: None,
            skip_votes: HashSet::new(),
            answers_known: false,
            version: 0,
        }
    }

    // -----------------------------------------------------------------
    // Membership and host model
    // -----------------------------------------------------------------

    /// Admit a connection, resolving identity against existing members.
    pub fn join(
        &mut self,
        conn: &str,
        requested_name: &str,
        user_id: Option<String>,
        avatar: Option<String>,
        now_ms: u64,
    ) -> Result<Vec<RoomEvent>, ServiceError> {
        if let Some(uid) = user_id.as_deref() {
            // Host reattach: the owning identity reclaims the host handle.
            if self.host_user.as_deref() == Some(uid) {
                self.host_conn = conn.to_string();
            }
        }

        // First-login adoption: the creator's first verified join binds host
        // rights to their stable identity.
        if self.host_user.is_none() && self.host_conn == conn {
            self.host_user = user_id.clone();
        }

        // Re-join on the same connection: refresh identity, no announcement.
        if let Some(member) = self.members.get_mut(conn) {
            if member.user_id.is_none() {
                member.user_id = user_id;
            }
            if member.avatar.is_none() {
                member.avatar = avatar;
            }
            self.touch();
            return Ok(Vec::new());
        }

        let name = trim_name(requested_name);
        if name.is_empty() {
            return Err(ServiceError::InvalidInput("name must not be empty".into()));
        }

        let mut member = match user_id
            .as_deref()
            .and_then(|uid| self.member_conn_by_user(uid))
        {
            // Same identity under another handle (reconnect or a sentinel
            // snapshot entry): migrate it, carrying the score over.
            Some(old_conn) => {
                let mut member = self
                    .members
                    .shift_remove(&old_conn)
                    .expect("membership index out of sync");
                member.avatar = avatar.or(member.avatar);
                self.skip_votes.remove(&old_conn);
                member
            }
            None => Member {
                name: String::new(),
                score: 0,
                user_id,
                avatar,
            },
        };

        member.name = self.dedupe_name(&name);
        let display_name = member.name.clone();
        self.members.insert(conn.to_string(), member);
        self.touch();

        Ok(vec![system_chat(
            format!("{display_name} joined the room"),
            now_ms,
        )])
    }

    /// Rename a member, suffixing a random tag on collision.
    pub fn set_name(&mut self, conn: &str, requested_name: &str) -> Result<(), ServiceError> {
        let name = trim_name(requested_name);
        if name.is_empty() {
            return Err(ServiceError::InvalidInput("name must not be empty".into()));
        }

        let collides = self
            .members
            .iter()
            .any(|(other_conn, member)| other_conn != conn && member.name == name);
        let final_name = if collides {
            format!("{name}#{}", rand::rng().random_range(1..=99))
        } else {
            name
        };

        let member = self
            .members
            .get_mut(conn)
            .ok_or_else(|| ServiceError::NotFound("not a member of this room".into()))?;
        member.name = final_name;
        self.touch();
        Ok(())
    }

    /// Remove a connection. Returns the events to broadcast and whether the
    /// room is now empty.
    pub fn disconnect(&mut self, conn: &str, now_ms: u64) -> (Vec<RoomEvent>, bool) {
        let Some(member) = self.members.shift_remove(conn) else {
            return (Vec::new(), self.members.is_empty());
        };

        let mut events = vec![system_chat(format!("{} left the room", member.name), now_ms)];
        self.skip_votes.remove(conn);
        events.extend(self.tidy_buzzer_after_leave(conn));

        if self.host_conn == conn {
            self.host_conn = self
                .members
                .keys()
                .next()
                .cloned()
                .unwrap_or_default();
        }

        self.touch();
        (events, self.members.is_empty())
    }

    /// Force a member out (host only).
    pub fn kick(
        &mut self,
        caller: &str,
        target_conn: &str,
        now_ms: u64,
    ) -> Result<Vec<RoomEvent>, ServiceError> {
        self.ensure_host(caller)?;
        if !self.members.contains_key(target_conn) {
            return Err(ServiceError::NotFound("no such player".into()));
        }

        let mut events = vec![RoomEvent::one(
            target_conn,
            ServerMessage::Kicked(KickedDto {
                message: "you have been removed from the room".into(),
            }),
        )];
        let (leave_events, _empty) = self.disconnect(target_conn, now_ms);
        events.extend(leave_events);
        Ok(events)
    }

    // -----------------------------------------------------------------
    // Game start and round progression
    // -----------------------------------------------------------------

    /// Install the round pool and arm the game (host only).
    pub fn start_game(
        &mut self,
        caller: &str,
        mode: PlayMode,
        game_type: GameType,
        mut tracks: Vec<TrackInfo>,
        min_tracks: usize,
        round_limit: Option<usize>,
    ) -> Result<Vec<RoomEvent>, ServiceError> {
        self.ensure_host(caller)?;
        if tracks.len() < min_tracks.max(1) {
            return Err(ServiceError::InvalidInput(format!(
                "a game requires at least {} track(s)",
                min_tracks.max(1)
            )));
        }

        {
            use rand::seq::SliceRandom;
            let mut rng = rand::rng();
            tracks.shuffle(&mut rng);
        }

        self.mode = mode;
        self.game_type = game_type;
        self.tracks = tracks;
        self.round_limit = round_limit;
        self.round_index = 0;
        self.current_round = None;
        self.skip_votes.clear();
        self.answers_known = true;
        self.touch();

        Ok(vec![RoomEvent::all(ServerMessage::GameStarted(
            GameStartedDto { mode, game_type },
        ))])
    }

    /// Number of rounds this game can run.
    pub fn round_cap(&self) -> usize {
        match self.round_limit {
            Some(limit) => self.tracks.len().min(limit),
            None => self.tracks.len(),
        }
    }

    /// Validate a `nextRound` request and describe the work to do outside the
    /// room lock.
    pub fn plan_next_round(&self, caller: &str) -> Result<NextRoundPlan, ServiceError> {
        self.ensure_host(caller)?;
        if !self.answers_known {
            return Err(ServiceError::InvalidInput("game has not started".into()));
        }
        if self.round_index >= self.round_cap() {
            return Ok(NextRoundPlan::Exhausted);
        }
        Ok(NextRoundPlan::Resolve {
            start_index: self.round_index,
            tracks: self.tracks[self.round_index..].to_vec(),
            mode: self.mode,
        })
    }

    /// Commit a resolved round. `track_index` is the absolute pool index the
    /// resolver succeeded on; earlier tracks were unplayable and are skipped
    /// for good.
    pub fn commit_round(
        &mut self,
        caller: &str,
        planned_index: usize,
        track_index: usize,
        playback: Playback,
        now_ms: u64,
    ) -> Result<Vec<RoomEvent>, ServiceError> {
        self.ensure_host(caller)?;
        // A competing commit (or restart) happened while playback resolved.
        if self.round_index != planned_index {
            return Err(ServiceError::InvalidInput(
                "round advanced while resolving playback".into(),
            ));
        }

        let track = self
            .tracks
            .get(track_index)
            .ok_or_else(|| ServiceError::InvalidInput("track index out of range".into()))?
            .clone();

        let hint = Hint {
            title_len: track.title.chars().count(),
            artist_len: track.artist.chars().count(),
        };
        let round = Round {
            started_at: now_ms,
            track: track.clone(),
            playback: playback.clone(),
            answer: Answer {
                title: track.title.clone(),
                artist: track.artist.clone(),
            },
            solved: false,
            paused: false,
            hint,
            buzzer: None,
        };

        self.current_round = Some(round);
        self.round_index = track_index + 1;
        self.skip_votes.clear();
        self.touch();

        Ok(vec![RoomEvent::all(ServerMessage::RoundStart(
            RoundStartDto {
                mode: self.mode,
                game_type: self.game_type,
                started_at: now_ms,
                hint,
                playback,
            },
        ))])
    }

    /// End the game because the pool is exhausted (host only).
    pub fn game_over(&mut self, caller: &str) -> Result<Vec<RoomEvent>, ServiceError> {
        self.ensure_host(caller)?;
        self.current_round = None;
        self.touch();
        Ok(vec![RoomEvent::all(ServerMessage::GameOver(GameOverDto {
            scores: self.scoreboard(),
        }))])
    }

    /// Toggle the pause flag (host only).
    pub fn set_paused(&mut self, caller: &str, paused: bool) -> Result<Vec<RoomEvent>, ServiceError> {
        self.ensure_host(caller)?;
        let round = self.active_round_mut()?;
        round.paused = paused;
        self.touch();
        let message = if paused {
            ServerMessage::PausePlayback {}
        } else {
            ServerMessage::ResumePlayback {}
        };
        Ok(vec![RoomEvent::all(message)])
    }

    // -----------------------------------------------------------------
    // Text-mode scoring
    // -----------------------------------------------------------------

    /// Evaluate a free-form guess. The first non-zero guess ends the round;
    /// arrival order at the engine breaks ties.
    pub fn guess(
        &mut self,
        conn: &str,
        guess_text: &str,
        now_ms: u64,
    ) -> Result<(Vec<RoomEvent>, Option<LeaderboardDelta>), ServiceError> {
        if self.game_type != GameType::Text {
            return Err(ServiceError::WrongMode);
        }
        if !self.members.contains_key(conn) {
            return Err(ServiceError::NotFound("not a member of this room".into()));
        }

        let (answer, started_at) = {
            let round = self.active_round_ref()?;
            (round.answer.clone(), round.started_at)
        };

        let verdict = matching::detailed_match("", guess_text, &answer.artist, &answer.title);
        let points = match (verdict.title_correct, verdict.artist_correct) {
            (true, true) => FULL_POINTS,
            (true, false) => TITLE_POINTS,
            _ => 0,
        };
        if points == 0 {
            return Ok((Vec::new(), None));
        }

        let member = self
            .members
            .get_mut(conn)
            .expect("membership checked above");
        member.score += points;
        let winner = member.name.clone();
        let delta = member.user_id.clone().map(|user_id| LeaderboardDelta {
            user_id,
            name: winner.clone(),
            delta: points as i64,
        });

        let round = self
            .current_round
            .as_mut()
            .expect("active round checked above");
        round.solved = true;

        let events = vec![RoomEvent::all(ServerMessage::RoundEnd(RoundEndDto {
            winner: Some(winner),
            answer,
            elapsed_ms: now_ms.saturating_sub(started_at),
            scores: self.scoreboard(),
            skipped: false,
        }))];
        self.touch();
        Ok((events, delta))
    }

    /// Register a skip vote; a strict majority ends the round with no winner.
    pub fn vote_skip(&mut self, conn: &str, now_ms: u64) -> Result<Vec<RoomEvent>, ServiceError> {
        if !self.members.contains_key(conn) {
            return Err(ServiceError::NotFound("not a member of this room".into()));
        }
        let (answer, started_at) = {
            let round = self.active_round_ref()?;
            (round.answer.clone(), round.started_at)
        };

        self.skip_votes.insert(conn.to_string());
        self.touch();

        if self.skip_votes.len() * 2 <= self.members.len() {
            return Ok(Vec::new());
        }

        let round = self
            .current_round
            .as_mut()
            .expect("active round checked above");
        round.solved = true;

        Ok(vec![RoomEvent::all(ServerMessage::RoundEnd(RoundEndDto {
            winner: None,
            answer,
            elapsed_ms: now_ms.saturating_sub(started_at),
            scores: self.scoreboard(),
            skipped: true,
        }))])
    }

    // -----------------------------------------------------------------
    // Buzzer-mode protocol
    // -----------------------------------------------------------------

    /// Handle a buzz. First buzz pauses playback and seats the caller as
    /// holder; later buzzes queue FIFO; duplicates are no-ops.
    pub fn buzz(&mut self, conn: &str, now_ms: u64) -> Result<Vec<RoomEvent>, ServiceError> {
        if self.game_type != GameType::Buzzer {
            return Err(ServiceError::WrongMode);
        }
        let name = self
            .members
            .get(conn)
            .map(|member| member.name.clone())
            .ok_or_else(|| ServiceError::NotFound("not a member of this room".into()))?;

        let round = self.active_round_mut()?;
        if round.buzzer.is_none() {
            round.buzzer = Some(Buzzer {
                first_buzz_at: now_ms,
                holder: conn.to_string(),
                holder_name: name.clone(),
                queue: VecDeque::new(),
            });
            round.paused = true;
            self.touch();
            return Ok(vec![
                RoomEvent::all(ServerMessage::PausePlayback {}),
                RoomEvent::all(ServerMessage::Buzzed(BuzzedDto {
                    id: conn.to_string(),
                    name,
                    at: now_ms,
                })),
                RoomEvent::all(ServerMessage::QueueUpdated(QueueUpdatedDto {
                    queue: Vec::new(),
                })),
            ]);
        }

        let buzzer = round.buzzer.as_mut().expect("buzzer presence checked above");
        if buzzer.contains(conn) {
            return Ok(Vec::new());
        }
        buzzer.queue.push_back(QueueEntry {
            conn: conn.to_string(),
            name,
            at: now_ms,
        });
        let queue = buzzer.queue_dto();
        self.touch();
        Ok(vec![RoomEvent::all(ServerMessage::QueueUpdated(
            QueueUpdatedDto { queue },
        ))])
    }

    /// Rotate the buzzer to the next queued member, or clear it (host only).
    pub fn pass_buzzer(&mut self, caller: &str) -> Result<Vec<RoomEvent>, ServiceError> {
        self.ensure_host(caller)?;
        let round = self.active_round_mut()?;
        let Some(buzzer) = round.buzzer.as_mut() else {
            return Ok(Vec::new());
        };

        let events = match buzzer.queue.pop_front() {
            Some(next) => {
                buzzer.holder = next.conn.clone();
                buzzer.holder_name = next.name.clone();
                // The new holder owes a spoken answer; playback stays paused.
                round.paused = true;
                vec![
                    RoomEvent::all(ServerMessage::Buzzed(BuzzedDto {
                        id: next.conn,
                        name: next.name,
                        at: next.at,
                    })),
                    RoomEvent::all(ServerMessage::QueueUpdated(QueueUpdatedDto {
                        queue: buzzer.queue_dto(),
                    })),
                    RoomEvent::all(ServerMessage::PausePlayback {}),
                ]
            }
            None => {
                round.buzzer = None;
                round.paused = false;
                vec![
                    RoomEvent::all(ServerMessage::BuzzCleared {}),
                    RoomEvent::all(ServerMessage::ResumePlayback {}),
                ]
            }
        };
        self.touch();
        Ok(events)
    }

    /// Adjust a member's score by name (host only). Deductions clamp at zero;
    /// the returned delta reflects what was actually applied.
    pub fn adjust_points(
        &mut self,
        caller: &str,
        player_name: &str,
        points: u32,
        award: bool,
    ) -> Result<Option<LeaderboardDelta>, ServiceError> {
        self.ensure_host(caller)?;
        let member = self
            .members
            .values_mut()
            .find(|member| member.name == player_name)
            .ok_or_else(|| ServiceError::NotFound(format!("no player named `{player_name}`")))?;

        let applied: i64 = if award {
            member.score += points;
            points as i64
        } else {
            let before = member.score;
            member.score = member.score.saturating_sub(points);
            -((before - member.score) as i64)
        };

        let delta = member.user_id.clone().map(|user_id| LeaderboardDelta {
            user_id,
            name: member.name.clone(),
            delta: applied,
        });
        self.touch();
        Ok(delta)
    }

    /// Close the round by host decision; the current holder (if any) wins.
    pub fn end_round_manual(
        &mut self,
        caller: &str,
        now_ms: u64,
    ) -> Result<Vec<RoomEvent>, ServiceError> {
        self.ensure_host(caller)?;
        let round = self.active_round_mut()?;
        round.solved = true;

        let (winner, elapsed_ms) = match round.buzzer.as_ref() {
            Some(buzzer) => (
                Some(buzzer.holder_name.clone()),
                buzzer.first_buzz_at.saturating_sub(round.started_at),
            ),
            None => (None, now_ms.saturating_sub(round.started_at)),
        };
        let answer = round.answer.clone();

        let events = vec![RoomEvent::all(ServerMessage::RoundEnd(RoundEndDto {
            winner,
            answer,
            elapsed_ms,
            scores: self.scoreboard(),
            skipped: false,
        }))];
        self.touch();
        Ok(events)
    }

    /// Advisory answer check against the current round (host only). Does not
    /// alter room state.
    pub fn host_verify(
        &self,
        caller: &str,
        artist: &str,
        title: &str,
    ) -> Result<VerifyResultDto, ServiceError> {
        self.ensure_host(caller)?;
        let round = self.active_round_ref()?;
        let verdict =
            matching::detailed_match(artist, title, &round.answer.artist, &round.answer.title);
        Ok(VerifyResultDto {
            artist_correct: verdict.artist_correct,
            title_correct: verdict.title_correct,
        })
    }

    /// Validate and shape a chat line from a member.
    pub fn chat(
        &self,
        conn: &str,
        text: &str,
        now_ms: u64,
    ) -> Result<Vec<RoomEvent>, ServiceError> {
        let member = self
            .members
            .get(conn)
            .ok_or_else(|| ServiceError::NotFound("not a member of this room".into()))?;
        let text: String = text.trim().chars().take(MAX_CHAT_LEN).collect();
        if text.is_empty() {
            return Err(ServiceError::InvalidInput("empty message".into()));
        }
        Ok(vec![RoomEvent::all(ServerMessage::Chat(ChatDto {
            name: Some(member.name.clone()),
            text,
            system: false,
            at: now_ms,
        }))])
    }

    // -----------------------------------------------------------------
    // Projections
    // -----------------------------------------------------------------

    /// Client-facing snapshot of the whole room.
    pub fn state_dto(&self) -> RoomStateDto {
        RoomStateDto {
            code: self.code.clone(),
            host_conn: self.host_conn.clone(),
            players: self
                .members
                .iter()
                .map(|(conn, member)| PlayerDto {
                    id: conn.clone(),
                    name: member.name.clone(),
                    score: member.score,
                    avatar: member.avatar.clone(),
                })
                .collect(),
            skip_votes: self.skip_votes.len(),
            has_tracks: !self.tracks.is_empty(),
            game_started: self.answers_known,
            game_type: self.game_type,
            round_count: self.round_cap(),
            current_round: self.current_round.as_ref().map(|round| CurrentRoundDto {
                started_at: round.started_at,
                hint: round.hint,
                playback: round.playback.clone(),
                solved: round.solved,
                paused: round.paused,
                buzzer: round.buzzer.as_ref().map(|buzzer| BuzzerDto {
                    current_holder: buzzer.holder.clone(),
                    current_holder_name: buzzer.holder_name.clone(),
                    queue: buzzer.queue_dto(),
                }),
            }),
            seq: self.version,
        }
    }

    pub fn scoreboard(&self) -> Vec<ScoreDto> {
        self.members
            .values()
            .map(|member| ScoreDto {
                name: member.name.clone(),
                score: member.score,
            })
            .collect()
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn touch(&mut self) {
        self.version += 1;
    }

    fn ensure_host(&self, conn: &str) -> Result<(), ServiceError> {
        if self.host_conn == conn {
            Ok(())
        } else {
            Err(ServiceError::Permission("host-only operation".into()))
        }
    }

    fn active_round_ref(&self) -> Result<&Round, ServiceError> {
        match self.current_round.as_ref() {
            Some(round) if !round.solved => Ok(round),
            _ => Err(ServiceError::NoRound),
        }
    }

    fn active_round_mut(&mut self) -> Result<&mut Round, ServiceError> {
        match self.current_round.as_mut() {
            Some(round) if !round.solved => Ok(round),
            _ => Err(ServiceError::NoRound),
        }
    }

    fn member_conn_by_user(&self, user_id: &str) -> Option<String> {
        self.members
            .iter()
            .find(|(_, member)| member.user_id.as_deref() == Some(user_id))
            .map(|(conn, _)| conn.clone())
    }

    fn dedupe_name(&self, name: &str) -> String {
        if !self.members.values().any(|member| member.name == name) {
            return name.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{name}#{n}");
            if !self.members.values().any(|member| member.name == candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Repair the buzzer after a member leaves mid-round.
    fn tidy_buzzer_after_leave(&mut self, conn: &str) -> Vec<RoomEvent> {
        let Some(round) = self.current_round.as_mut() else {
            return Vec::new();
        };
        let Some(buzzer) = round.buzzer.as_mut() else {
            return Vec::new();
        };

        if buzzer.holder == conn {
            return match buzzer.queue.pop_front() {
                Some(next) => {
                    buzzer.holder = next.conn.clone();
                    buzzer.holder_name = next.name.clone();
                    vec![
                        RoomEvent::all(ServerMessage::Buzzed(BuzzedDto {
                            id: next.conn,
                            name: next.name,
                            at: next.at,
                        })),
                        RoomEvent::all(ServerMessage::QueueUpdated(QueueUpdatedDto {
                            queue: buzzer.queue_dto(),
                        })),
                    ]
                }
                None => {
                    round.buzzer = None;
                    vec![RoomEvent::all(ServerMessage::BuzzCleared {})]
                }
            };
        }

        let before = buzzer.queue.len();
        buzzer.queue.retain(|entry| entry.conn != conn);
        if buzzer.queue.len() != before {
            return vec![RoomEvent::all(ServerMessage::QueueUpdated(
                QueueUpdatedDto {
                    queue: buzzer.queue_dto(),
                },
            ))];
        }
        Vec::new()
    }
}

impl Room {
    /// Durable projection per the snapshot contract: members flatten to their
    /// stable identity, the buzzer is connection-bound and dropped.
    pub fn to_entity(&self) -> crate::dao::models::RoomEntity {
        use crate::dao::models::{PlayerEntity, RoomEntity, RoundEntity};

        let players = self
            .members
            .values()
            .filter_map(|member| {
                member.user_id.clone().map(|uid| {
                    (
                        uid,
                        PlayerEntity {
                            name: member.name.clone(),
                            score: member.score,
                        },
                    )
                })
            })
            .collect();

        RoomEntity {
            code: self.code.clone(),
            host_user: self.host_user.clone(),
            mode: self.mode,
            game_type: self.game_type,
            round_index: self.round_index,
            round_limit: self.round_limit,
            tracks: self.tracks.clone(),
            answers_known: self.answers_known,
            current_round: self.current_round.as_ref().map(|round| RoundEntity {
                started_at_ms: round.started_at,
                track: round.track.clone(),
                playback: round.playback.clone(),
                solved: round.solved,
                paused: round.paused,
            }),
            players,
            version: self.version,
        }
    }

    /// Reconstruct a room from a snapshot. Nobody is connected yet, so every
    /// restored member gets a sentinel `pending-<uid>` handle resolved on the
    /// owner's next join, and the host handle stays empty until the host user
    /// reattaches.
    pub fn from_entity(entity: crate::dao::models::RoomEntity) -> Self {
        let members = entity
            .players
            .into_iter()
            .map(|(uid, player)| {
                (
                    format!("{PENDING_PREFIX}{uid}"),
                    Member {
                        name: player.name,
                        score: player.score,
                        user_id: Some(uid),
                        avatar: None,
                    },
                )
            })
            .collect();

        Self {
            code: entity.code,
            host_conn: String::new(),
            host_user: entity.host_user,
            members,
            mode: entity.mode,
            game_type: entity.game_type,
            tracks: entity.tracks,
            round_index: entity.round_index,
            round_limit: entity.round_limit,
            current_round: entity.current_round.map(|round| Round {
                started_at: round.started_at_ms,
                answer: Answer {
                    title: round.track.title.clone(),
                    artist: round.track.artist.clone(),
                },
                hint: Hint {
                    title_len: round.track.title.chars().count(),
                    artist_len: round.track.artist.chars().count(),
                },
                track: round.track,
                playback: round.playback,
                solved: round.solved,
                paused: round.paused,
                buzzer: None,
            }),
            skip_votes: HashSet::new(),
            answers_known: entity.answers_known,
            version: entity.version,
        }
    }
}

/// Trim a requested display name to the permitted length.
fn trim_name(raw: &str) -> String {
    raw.trim().chars().take(MAX_NAME_LEN).collect()
}

fn system_chat(text: String, now_ms: u64) -> RoomEvent {
    RoomEvent::all(ServerMessage::Chat(ChatDto {
        name: None,
        text,
        system: true,
        at: now_ms,
    }))
}
