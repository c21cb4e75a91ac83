//! Stream Playback - 打字机式回放
//!
//! 片段到达与逐字显示解耦：片段随时追加到缓冲，显示每次揭示一个字符。
//! 只有同时满足「流已关闭」与「显示已追平」时才调用一次 finalize。
//!
//! 状态: Idle → Receiving → CaughtUpAndClosed（终态），
//! 或在任意时刻因取消/错误退出。

use futures_util::{FutureExt, Stream, StreamExt};

use super::task::GenerationTask;
use crate::application::ports::{GenerationEvent, PlaybackProgress};
use crate::domain::count_words;

/// 回放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Receiving,
    CaughtUpAndClosed,
}

/// 回放缓冲
///
/// `displayed` 始终是 `received` 的前缀
#[derive(Debug, Default)]
pub struct PlaybackBuffer {
    raw: String,
    /// 已显示部分的字节长度（总在字符边界上）
    displayed_len: usize,
    displayed_chars: usize,
    received_chars: usize,
    closed: bool,
    reported_word_count: Option<usize>,
}

impl PlaybackBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加片段
    pub fn push(&mut self, fragment: &str) {
        self.raw.push_str(fragment);
        self.received_chars += fragment.chars().count();
    }

    /// 标记流已关闭
    pub fn close(&mut self, reported_word_count: Option<usize>) {
        self.closed = true;
        self.reported_word_count = reported_word_count;
    }

    /// 揭示下一个字符
    pub fn reveal_next(&mut self) -> Option<char> {
        let ch = self.raw[self.displayed_len..].chars().next()?;
        self.displayed_len += ch.len_utf8();
        self.displayed_chars += 1;
        Some(ch)
    }

    pub fn is_caught_up(&self) -> bool {
        self.displayed_len == self.raw.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 流已关闭且显示已追平
    pub fn is_finalizable(&self) -> bool {
        self.closed && self.is_caught_up()
    }

    pub fn received(&self) -> &str {
        &self.raw
    }

    pub fn displayed(&self) -> &str {
        &self.raw[..self.displayed_len]
    }

    pub fn progress(&self) -> PlaybackProgress {
        PlaybackProgress {
            displayed_chars: self.displayed_chars,
            received_chars: self.received_chars,
            stream_closed: self.closed,
        }
    }

    fn into_final(self) -> FinalText {
        FinalText {
            word_count: count_words(&self.raw),
            reported_word_count: self.reported_word_count,
            text: self.raw,
        }
    }
}

/// 最终文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalText {
    pub text: String,
    /// 按空白分割统计
    pub word_count: usize,
    /// 生成服务在完成事件中报告的词数
    pub reported_word_count: Option<usize>,
}

/// 回放观察者（UI 推送、进度事件）
pub trait PlaybackObserver: Send {
    /// 收到新片段
    fn on_fragment(&mut self, _fragment: &str, _progress: PlaybackProgress) {}

    /// 揭示了一个字符
    fn on_reveal(&mut self, _ch: char, _progress: PlaybackProgress) {}
}

/// 不做任何事的观察者
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PlaybackObserver for NoopObserver {}

/// 回放结果
#[derive(Debug)]
pub enum PlaybackOutcome<T> {
    /// finalize 已执行
    Finalized(T),
    /// 取消，缓冲已丢弃
    Cancelled { displayed: String },
    /// 生成出错，保留已显示部分
    Failed { message: String, displayed: String },
}

/// 单次生成的打字机回放
pub struct StreamPlayback<'a> {
    task: &'a GenerationTask,
    observer: &'a mut dyn PlaybackObserver,
    buffer: PlaybackBuffer,
    state: PlaybackState,
}

impl<'a> StreamPlayback<'a> {
    pub fn new(task: &'a GenerationTask, observer: &'a mut dyn PlaybackObserver) -> Self {
        Self {
            task,
            observer,
            buffer: PlaybackBuffer::new(),
            state: PlaybackState::Idle,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// 消费事件流直到终态
    ///
    /// 每次揭示字符之后让出调度，新片段可以在显示过程中追加。
    /// `finalize` 最多调用一次；调用前登记进入提交阶段，此后取消不再生效。
    pub async fn run<S, F, T>(mut self, mut events: S, finalize: F) -> PlaybackOutcome<T>
    where
        S: Stream<Item = GenerationEvent> + Unpin,
        F: FnOnce(FinalText) -> T,
    {
        self.state = PlaybackState::Receiving;

        loop {
            if self.task.is_cancelled() {
                return self.cancelled();
            }

            if !self.buffer.is_closed() {
                // 显示已追平时等待下一个事件，否则只取已就绪的事件
                let next = if self.buffer.is_caught_up() {
                    Some(events.next().await)
                } else {
                    events.next().now_or_never()
                };

                if let Some(event) = next {
                    // 等待期间可能已被取消
                    if self.task.is_cancelled() {
                        return self.cancelled();
                    }
                    match event {
                        Some(GenerationEvent::Content { text }) => self.receive(&text),
                        Some(GenerationEvent::Complete { word_count }) => {
                            self.buffer.close(word_count);
                            self.task.report(self.buffer.progress());
                        }
                        Some(GenerationEvent::Error { message }) => return self.failed(message),
                        None => {
                            return self.failed("stream ended before completion".to_string())
                        }
                    }
                    continue;
                }
            }

            if let Some(ch) = self.buffer.reveal_next() {
                let progress = self.buffer.progress();
                self.observer.on_reveal(ch, progress);
                self.task.report(progress);
                tokio::task::yield_now().await;
                continue;
            }

            debug_assert!(self.buffer.is_finalizable());
            if !self.task.seal() {
                return self.cancelled();
            }
            self.state = PlaybackState::CaughtUpAndClosed;
            let final_text = std::mem::take(&mut self.buffer).into_final();

            tracing::debug!(
                story_id = %self.task.story_id(),
                target = %self.task.target(),
                attempt = self.task.attempt(),
                words = final_text.word_count,
                reported_words = ?final_text.reported_word_count,
                "Playback finalized"
            );
            return PlaybackOutcome::Finalized(finalize(final_text));
        }
    }

    fn receive(&mut self, fragment: &str) {
        self.buffer.push(fragment);
        let progress = self.buffer.progress();
        self.observer.on_fragment(fragment, progress);
        self.task.report(progress);
    }

    fn cancelled<T>(self) -> PlaybackOutcome<T> {
        tracing::info!(
            story_id = %self.task.story_id(),
            target = %self.task.target(),
            attempt = self.task.attempt(),
            received_chars = self.buffer.progress().received_chars,
            "Playback cancelled, buffer discarded"
        );
        PlaybackOutcome::Cancelled {
            displayed: self.buffer.displayed().to_string(),
        }
    }

    fn failed<T>(self, message: String) -> PlaybackOutcome<T> {
        tracing::warn!(
            story_id = %self.task.story_id(),
            target = %self.task.target(),
            attempt = self.task.attempt(),
            error = %message,
            "Playback failed"
        );
        PlaybackOutcome::Failed {
            message,
            displayed: self.buffer.displayed().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    use crate::application::ports::{FlightRegistryPort, FragmentStream};
    use crate::domain::{GenerationTarget, StepNumber, StoryId};
    use crate::infrastructure::memory::InMemoryFlightRegistry;

    fn content(text: &str) -> GenerationEvent {
        GenerationEvent::Content {
            text: text.to_string(),
        }
    }

    fn complete() -> GenerationEvent {
        GenerationEvent::Complete { word_count: None }
    }

    fn channel() -> (mpsc::UnboundedSender<GenerationEvent>, FragmentStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed();
        (tx, stream)
    }

    fn begin_task() -> (Arc<dyn FlightRegistryPort>, GenerationTask) {
        let flights: Arc<dyn FlightRegistryPort> = Arc::new(InMemoryFlightRegistry::new());
        let task = GenerationTask::begin(
            &flights,
            StoryId::new(),
            GenerationTarget::Step(StepNumber::FIRST),
        )
        .unwrap();
        (flights, task)
    }

    /// 记录揭示序列，并检查显示始终不超过接收
    #[derive(Default)]
    struct RecordingObserver {
        fragments: Vec<String>,
        revealed: String,
        violations: usize,
        cancel_after: Option<(usize, Arc<dyn FlightRegistryPort>, StoryId)>,
    }

    impl PlaybackObserver for RecordingObserver {
        fn on_fragment(&mut self, fragment: &str, progress: PlaybackProgress) {
            self.fragments.push(fragment.to_string());
            if progress.displayed_chars > progress.received_chars {
                self.violations += 1;
            }
        }

        fn on_reveal(&mut self, ch: char, progress: PlaybackProgress) {
            self.revealed.push(ch);
            if progress.displayed_chars > progress.received_chars
                || progress.displayed_chars != self.revealed.chars().count()
            {
                self.violations += 1;
            }
            if let Some((after, flights, story_id)) = &self.cancel_after {
                if progress.displayed_chars == *after {
                    flights.cancel(*story_id);
                }
            }
        }
    }

    #[test]
    fn test_buffer_reveals_whole_characters() {
        let mut buffer = PlaybackBuffer::new();
        buffer.push("hé");
        buffer.push("llo");
        assert_eq!(buffer.reveal_next(), Some('h'));
        assert_eq!(buffer.reveal_next(), Some('é'));
        assert_eq!(buffer.displayed(), "hé");
        assert_eq!(buffer.progress().received_chars, 5);
        assert!(!buffer.is_finalizable());

        buffer.close(None);
        while buffer.reveal_next().is_some() {}
        assert!(buffer.is_finalizable());
        assert_eq!(buffer.displayed(), buffer.received());
    }

    #[tokio::test]
    async fn test_fragments_commit_concatenation_once() {
        let (_flights, task) = begin_task();
        let (tx, stream) = channel();
        tx.send(content("A")).unwrap();
        tx.send(content("B")).unwrap();
        tx.send(complete()).unwrap();

        let mut observer = RecordingObserver::default();
        let mut calls = 0;
        let outcome = StreamPlayback::new(&task, &mut observer)
            .run(stream, |text| {
                calls += 1;
                text
            })
            .await;

        match outcome {
            PlaybackOutcome::Finalized(text) => {
                assert_eq!(text.text, "AB");
                assert_eq!(text.word_count, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(calls, 1);
        assert_eq!(observer.revealed, "AB");
        assert_eq!(observer.violations, 0);
    }

    #[tokio::test]
    async fn test_interleaved_arrival_finalizes_exactly_once() {
        let fragments = ["Once ", "upon ", "a ", "", "time, ", "in a land."];
        let expected: String = fragments.concat();

        // 片段之间让出不同次数，覆盖「追平后又到达」与「显示中到达」两种交错
        for pause in 0..6usize {
            let (_flights, task) = begin_task();
            let (tx, stream) = channel();
            let mut observer = RecordingObserver::default();
            let mut calls = 0;

            let producer = async move {
                for (i, fragment) in fragments.iter().enumerate() {
                    tx.send(content(fragment)).unwrap();
                    for _ in 0..(pause * (i % 3)) {
                        tokio::task::yield_now().await;
                    }
                }
                tx.send(complete()).unwrap();
            };

            let playback = StreamPlayback::new(&task, &mut observer).run(stream, |text| {
                calls += 1;
                text.text
            });
            let (outcome, _) = tokio::join!(playback, producer);

            match outcome {
                PlaybackOutcome::Finalized(text) => assert_eq!(text, expected),
                other => panic!("pause {}: unexpected outcome {:?}", pause, other),
            }
            assert_eq!(calls, 1);
            assert_eq!(observer.revealed, expected);
            assert_eq!(observer.violations, 0);
        }
    }

    #[tokio::test]
    async fn test_cancel_before_close_discards_buffer() {
        let (_flights, task) = begin_task();
        let (tx, stream) = channel();
        let mut observer = RecordingObserver::default();
        let mut finalized = false;

        let task_ref = &task;
        let producer = async move {
            tx.send(content("partial text")).unwrap();
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            task_ref.cancel();
            tx.send(content(" more")).unwrap();
            tx.send(complete()).unwrap();
        };

        let playback = StreamPlayback::new(&task, &mut observer).run(stream, |_| {
            finalized = true;
        });
        let (outcome, _) = tokio::join!(playback, producer);

        assert!(matches!(outcome, PlaybackOutcome::Cancelled { .. }));
        assert!(!finalized);
    }

    #[tokio::test]
    async fn test_cancel_after_close_before_caught_up_discards() {
        let (flights, task) = begin_task();
        let (tx, stream) = channel();
        tx.send(content("abcdef")).unwrap();
        tx.send(complete()).unwrap();

        let mut observer = RecordingObserver {
            cancel_after: Some((2, flights.clone(), task.story_id())),
            ..Default::default()
        };
        let mut finalized = false;
        let outcome = StreamPlayback::new(&task, &mut observer)
            .run(stream, |_| {
                finalized = true;
            })
            .await;

        match outcome {
            PlaybackOutcome::Cancelled { displayed } => assert_eq!(displayed, "ab"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!finalized);
    }

    #[tokio::test]
    async fn test_error_preserves_displayed_prefix() {
        let (_flights, task) = begin_task();
        let (tx, stream) = channel();
        let mut observer = RecordingObserver::default();
        let mut finalized = false;

        let producer = async move {
            tx.send(content("abc")).unwrap();
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
            tx.send(GenerationEvent::Error {
                message: "backend overloaded".to_string(),
            })
            .unwrap();
        };

        let playback = StreamPlayback::new(&task, &mut observer).run(stream, |_| {
            finalized = true;
        });
        let (outcome, _) = tokio::join!(playback, producer);

        match outcome {
            PlaybackOutcome::Failed { message, displayed } => {
                assert_eq!(message, "backend overloaded");
                assert!("abc".starts_with(&displayed));
                assert_eq!(displayed, observer.revealed);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!finalized);
    }

    #[tokio::test]
    async fn test_stream_without_completion_fails() {
        let (_flights, task) = begin_task();
        let (tx, stream) = channel();
        tx.send(content("x")).unwrap();
        drop(tx);

        let mut observer = NoopObserver;
        let outcome = StreamPlayback::new(&task, &mut observer)
            .run(stream, |text| text)
            .await;
        assert!(matches!(outcome, PlaybackOutcome::Failed { .. }));
    }
}
